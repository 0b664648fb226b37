use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Clap;
use rocket::routes;
use tokio::sync::mpsc::unbounded_channel;

mod bot;
use bot::Labrelay;

mod config;
use config::{LabrelayConfig, NotifierSettings};

mod webhooks;
use webhooks::{gitlab_webhook, EventSender};

#[derive(Clap)]
#[clap(version = "0.1")]
struct Opts {
    /// Configuration file for labrelay
    #[clap(short, long, parse(from_os_str))]
    config: PathBuf,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let config_file = File::open(&opts.config)
        .with_context(|| format!("couldn't open {}:", opts.config.display()))?;
    let config: LabrelayConfig = serde_yaml::from_reader(BufReader::new(config_file))
        .context("couldn't parse config file")?;
    // the environment is only read here, once
    let notifier = NotifierSettings::from_env();

    let (sender, receiver) = unbounded_channel();

    let relay = Labrelay::new(config, notifier).context("failed to create labrelay bot")?;
    tokio::spawn(async move { relay.run(receiver).await });

    let rocket = rocket::build()
        .mount("/", routes![gitlab_webhook])
        .manage(EventSender(sender));
    rocket.launch().await.map_err(|err| anyhow::anyhow!(err))
}
