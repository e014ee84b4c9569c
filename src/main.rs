use log::{info, warn, LevelFilter};

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use structopt::StructOpt;

use ansi_term::Colour::{Cyan, Green, Yellow};

use transplant::discord::{self, Templates};
use transplant::progress::Progress;
use transplant::reconcile::{self, Importer, Mode, Options, Snapshot, Summary};
use transplant::revolt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "transplant",
    about = "Imports a Discord server template into an existing Revolt server."
)]
struct Opt {
    /// Import mode: "smart" reuses existing channels and creates missing
    /// ones, "categories" only organizes existing channels, "clean" deletes
    /// everything first.
    #[structopt(long, default_value = "smart")]
    mode: RunMode,
    /// Ignore saved progress and start fresh.
    #[structopt(long)]
    fresh: bool,
    /// Plan and report without touching the server.
    #[structopt(long)]
    dry_run: bool,
    /// Similarity threshold for fuzzy name matching, between 0 and 1.
    #[structopt(long, default_value = "0.8")]
    threshold: f64,
    /// Read the template from a local JSON file instead of the Discord API.
    #[structopt(long, parse(from_os_str))]
    template_file: Option<PathBuf>,
    /// Where source-to-destination links are saved between runs.
    #[structopt(long, parse(from_os_str), default_value = "import_progress.json")]
    progress_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Smart,
    Categories,
    Clean,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<RunMode, String> {
        match s {
            "smart" => Ok(RunMode::Smart),
            "categories" => Ok(RunMode::Categories),
            "clean" => Ok(RunMode::Clean),
            other => Err(format!(
                "unknown mode {:?}, expected smart, categories or clean",
                other
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();

    env_logger::Builder::new()
        .filter(None, LevelFilter::Info)
        .parse_env("TRANSPLANT_LOG")
        .init();

    let opt = Opt::from_args();

    // pull in the template
    let template = match &opt.template_file {
        Some(path) => discord::load_file(path)?,
        None => {
            let url = env::var("DISCORD_TEMPLATE_URL")?;
            Templates::new()?.fetch(&url).await?
        }
    };

    info!(
        "template {:?}: {} channels, {} roles",
        template.name,
        template.channels.len(),
        template.roles.len(),
    );

    let token = env::var("REVOLT_BOT_TOKEN")?;
    let server_id = env::var("REVOLT_SERVER_ID")?;

    let client = revolt::Client::new(token)?;

    let server = client.fetch_server(&server_id).await?;
    info!("connected to server {:?}", server.name);

    let mut channels = client.fetch_channels(&server).await;
    info!("found {} existing channels", channels.len());

    let mut progress = if opt.fresh {
        Progress::fresh(&opt.progress_file)
    } else {
        Progress::open(&opt.progress_file)?
    };

    if !progress.links.is_empty() {
        info!(
            "resuming: {} channels and {} roles already linked",
            progress.links.channels.len(),
            progress.links.roles.len(),
        );
    }

    if opt.mode == RunMode::Clean {
        if opt.dry_run {
            info!("would delete {} existing channels", channels.len());
        } else {
            delete_all(&client, &channels).await;
            progress.links = Default::default();
        }

        channels = Vec::new();
    }

    // saved links are only trusted if the destination still exists
    let channel_ids: HashSet<String> = channels.iter().map(|ch| ch.id.clone()).collect();
    let role_ids: HashSet<String> = server.roles.keys().cloned().collect();
    progress.links.prune(&channel_ids, &role_ids);

    let snapshot = Snapshot::new(&server, channels);

    let options = Options {
        mode: match opt.mode {
            RunMode::Categories => Mode::CategoriesOnly,
            _ => Mode::Smart,
        },
        threshold: opt.threshold,
        ..Options::default()
    };

    let plan = reconcile::plan(&template, &snapshot, &progress.links, &options);

    let summary = Importer::new(&client, &server_id, &mut progress)
        .dry_run(opt.dry_run)
        .run(&plan)
        .await?;

    print_summary(&summary);

    Ok(())
}

/// Deletes every channel on the server, for clean-slate runs.
///
/// Individual failures are logged and skipped like everywhere else.
async fn delete_all(client: &revolt::Client, channels: &[revolt::Channel]) {
    info!("deleting {} existing channels", channels.len());

    for channel in channels {
        if let Err(err) = client.delete_channel(&channel.id).await {
            warn!("could not delete channel {:?}: {}", channel.name, err);
        }
    }
}

fn print_summary(summary: &Summary) {
    println!();
    println!("{}", Green.bold().paint("import complete"));
    println!("  {} {}", Cyan.paint("roles:     "), summary.roles);
    println!("  {} {}", Cyan.paint("categories:"), summary.categories);
    println!("  {} {}", Cyan.paint("channels:  "), summary.channels);
    println!("  {} {}", Cyan.paint("overwrites:"), summary.overwrites);

    let skipped = summary.roles.skipped + summary.channels.skipped + summary.overwrites.skipped;

    if skipped > 0 {
        println!(
            "{}",
            Yellow.paint(format!("{} entities were skipped, see the log above", skipped))
        );
    }
}
