use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use common::events::EventSink;
use common::job::{Job, JobState};
use common::runner::JobRunner;
use imgsync_tools_imgsync::{directory, display, ops};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "imgsync",
    version,
    about = "Move container images between hosts without a registry",
    long_about = "`imgsync` lists container images on local or SSH-reachable hosts and \
streams them between hosts - directly, or via an intermediate archive file.

Hosts come from a JSON directory file; each entry carries a name, an address \
(`localhost` or `host[:port]`), credentials and an endpoint kind.

EXAMPLES:
    # Register a host, then show the directory
    imgsync hosts add build-box 10.0.0.7:2222 --username ci --password secret
    imgsync hosts

    # List images on a host, sorted by name
    imgsync list build-box

    # Save two images into the current directory
    imgsync save build-box app:latest db:latest --progress

    # Import an archive on another host
    imgsync load staging app_latest.tar.gz

    # Stream every image from one host straight into another
    imgsync sync --from build-box --to staging --progress"
)]
struct Args {
    /// Host directory file (defaults to the user config directory)
    #[arg(long, value_name = "PATH", global = true)]
    hosts_file: Option<std::path::PathBuf>,

    /// Show a progress bar while jobs run
    #[arg(long, global = true)]
    progress: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Subcommand, Debug, Clone)]
enum CommandKind {
    /// Print or edit the hosts in the directory
    Hosts {
        #[command(subcommand)]
        action: Option<HostsAction>,
    },
    /// List images available on a host
    List {
        /// Host name (or #index) from the directory
        host: String,
    },
    /// Export images from a host into local archive files
    Save {
        /// Host name (or #index) from the directory
        host: String,
        /// Image names (repo:tag); every image on the host when empty
        images: Vec<String>,
        /// Directory archives are written into (default: current directory)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<std::path::PathBuf>,
    },
    /// Import local archive files into a host
    Load {
        /// Host name (or #index) from the directory
        host: String,
        /// Archive files to import
        #[arg(required = true)]
        files: Vec<std::path::PathBuf>,
    },
    /// Stream images from one host straight into another
    Sync {
        /// Source host name (or #index)
        #[arg(long)]
        from: String,
        /// Target host name (or #index)
        #[arg(long)]
        to: String,
        /// Image names (repo:tag); every image on the source when empty
        images: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum HostsAction {
    /// Append a host to the directory
    Add {
        /// Display name; duplicates are allowed
        name: String,
        /// `localhost`, or `host[:port]` for SSH
        address: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        password: String,
        /// Endpoint kind
        #[arg(long, default_value = endpoint::DOCKER_CLI)]
        kind: String,
    },
    /// Remove a host by name (or #index)
    Remove {
        host: String,
    },
}

async fn run_batch(jobs: Vec<Arc<Job>>, show_progress: bool) -> anyhow::Result<()> {
    anyhow::ensure!(!jobs.is_empty(), "nothing to do");
    let report_jobs = jobs.clone();
    let (events, rx) = EventSink::channel();
    let runner = JobRunner::submit(jobs, events);
    let mut display = tokio::spawn(display::drain(rx, show_progress));
    tokio::select! {
        res = &mut display => {
            let _ = res;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("cancellation requested, stopping the batch");
            runner.kill_all();
            let _ = (&mut display).await;
        }
    }
    runner.wait().await?;
    let failed = report_jobs
        .iter()
        .filter(|job| job.state() == JobState::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let hosts_path = args
        .hosts_file
        .clone()
        .unwrap_or_else(directory::default_path);
    match args.command {
        CommandKind::Hosts { action: None } => {
            let hosts = directory::load_hosts(&hosts_path)?;
            for (index, host) in hosts.iter().enumerate() {
                println!(
                    "#{index} {} ({}@{}, {})",
                    host.name, host.username, host.address, host.kind
                );
            }
            Ok(())
        }
        CommandKind::Hosts {
            action:
                Some(HostsAction::Add {
                    name,
                    address,
                    username,
                    password,
                    kind,
                }),
        } => {
            // a missing file just means an empty directory so far
            let mut hosts = if hosts_path.exists() {
                directory::load_hosts(&hosts_path)?
            } else {
                Vec::new()
            };
            hosts.push(directory::HostRecord {
                name,
                address,
                username,
                password,
                kind,
            });
            directory::save_hosts(&hosts_path, &hosts)?;
            Ok(())
        }
        CommandKind::Hosts {
            action: Some(HostsAction::Remove { host }),
        } => {
            let mut hosts = directory::load_hosts(&hosts_path)?;
            let index = directory::host_index(&hosts, &host)?;
            let removed = hosts.remove(index);
            directory::save_hosts(&hosts_path, &hosts)?;
            println!("removed {} ({})", removed.name, removed.address);
            Ok(())
        }
        CommandKind::List { host } => {
            let hosts = directory::load_hosts(&hosts_path)?;
            let host = directory::find_host(&hosts, &host)?.clone().into_host();
            let endpoint = host.endpoint()?;
            let images = ops::list_images_sorted(endpoint.as_ref())
                .with_context(|| format!("listing images on {:?} failed", host.name()))?;
            for image in &images {
                println!(
                    "{:<50} {:>10} {}",
                    image.name(),
                    image.size_display(),
                    image.id()
                );
            }
            Ok(())
        }
        CommandKind::Save {
            host,
            images,
            output_dir,
        } => {
            let hosts = directory::load_hosts(&hosts_path)?;
            let host = directory::find_host(&hosts, &host)?.clone().into_host();
            let selected = ops::select_images(host.endpoint()?.as_ref(), &images)?;
            let output_dir = match output_dir {
                Some(dir) => dir,
                None => std::env::current_dir().context("failed to get current directory")?,
            };
            let jobs = ops::save_jobs(&host, selected, output_dir)?;
            run_batch(jobs, args.progress).await
        }
        CommandKind::Load { host, files } => {
            let hosts = directory::load_hosts(&hosts_path)?;
            let host = directory::find_host(&hosts, &host)?.clone().into_host();
            let jobs = ops::load_jobs(&host, files)?;
            run_batch(jobs, args.progress).await
        }
        CommandKind::Sync { from, to, images } => {
            let hosts = directory::load_hosts(&hosts_path)?;
            let source = directory::find_host(&hosts, &from)?.clone().into_host();
            let target = directory::find_host(&hosts, &to)?.clone().into_host();
            let selected = ops::select_images(source.endpoint()?.as_ref(), &images)?;
            let jobs = ops::sync_jobs(&source, selected, &target)?;
            run_batch(jobs, args.progress).await
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let runtime = common::RuntimeConfig::default();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    common::run(&output, &runtime, func)
}
