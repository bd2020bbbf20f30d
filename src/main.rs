mod conditions;
mod config;
mod download;
mod errors;
mod image;
mod poller;
mod remote;
mod render;
mod resolver;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use conditions::Condition;
use config::{FetchConfig, TlsVerify};
use download::Downloader;
use image::{CandidateFile, ImageSpec};
use poller::{ConditionPoller, PollOutcome};
use remote::{ListingClient, MetadataFetcher};
use render::renderer_for;

#[derive(Parser)]
#[command(
    name = "obs-image-fetch",
    version,
    about = "Locate, verify, and download images published by an OBS download server"
)]
struct Cli {
    #[command(flatten)]
    shared: SharedOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SharedOpts {
    /// URL of the image download repository.
    #[arg(long, default_value = config::DEFAULT_DOWNLOAD_URL)]
    download_url: Url,

    /// Image name to look for in the listing. May embed pattern syntax.
    #[arg(long)]
    image_name: String,

    /// Architecture token embedded in image filenames.
    #[arg(long, default_value = config::DEFAULT_ARCH)]
    arch: String,

    /// Multibuild profile name.
    #[arg(long)]
    profile: Option<String>,

    /// Directory for downloaded images and checksums.
    #[arg(long, default_value = ".")]
    target_dir: PathBuf,

    /// Version format template; each {placeholder} captures one
    /// dot-separated numeric token.
    #[arg(long, default_value = image::DEFAULT_VERSION_FORMAT)]
    version_format: String,

    /// Allowed image extension; repeatable, order sets tie-break priority.
    #[arg(long = "extension")]
    extensions: Vec<String>,

    /// Checksum file extension; repeatable.
    #[arg(long = "checksum-extension")]
    checksum_extensions: Vec<String>,

    /// Disable TLS certificate verification.
    #[arg(long)]
    no_verify: bool,

    /// PEM CA bundle to trust instead of the system roots.
    #[arg(long, conflicts_with = "no_verify")]
    ca_bundle: Option<PathBuf>,

    /// Emit machine-readable JSON instead of plain text.
    #[arg(long)]
    json: bool,

    /// Hide the download progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the newest matching image, wait on conditions, then
    /// download and verify it.
    Download(DownloadOpts),

    /// Inspect the packages report of the resolved image.
    Packages {
        #[command(subcommand)]
        command: PackagesCommand,
    },
}

#[derive(Args)]
struct DownloadOpts {
    /// Seconds to keep polling until conditions are met.
    #[arg(long, default_value_t = 0)]
    conditions_wait_time: u64,

    /// Image version condition, e.g. ">=8.13.21".
    #[arg(long)]
    image_version: Option<String>,

    /// Image release condition, e.g. "==1.2".
    #[arg(long)]
    image_release: Option<String>,

    /// Package condition; repeatable, e.g. "zypper>=1.14.59".
    #[arg(long = "package")]
    packages: Vec<String>,

    /// Expected image checksum, e.g. "sha256:ab12...".
    #[arg(long)]
    expect_checksum: Option<String>,

    /// Pin an exact image version instead of picking the newest build.
    #[arg(long)]
    pin_version: Option<String>,

    /// Pin an exact release number.
    #[arg(long)]
    pin_release: Option<String>,

    /// Reject the image while any package carries this license; repeatable.
    #[arg(long = "disallow-license")]
    disallow_licenses: Vec<String>,

    /// Reject the image while any package name matches this glob;
    /// repeatable, e.g. "kernel-*".
    #[arg(long = "disallow-package")]
    disallow_packages: Vec<String>,
}

#[derive(Subcommand)]
enum PackagesCommand {
    /// Print the packages in the resolved image.
    List {
        /// Show only packages carrying this license; repeatable.
        #[arg(long = "filter-license")]
        filter_licenses: Vec<String>,

        /// Show only packages whose name matches this glob; repeatable.
        #[arg(long = "filter-package")]
        filter_packages: Vec<String>,
    },
    /// Print one package by name.
    Show { name: String },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn build_config(shared: &SharedOpts, wait_time: u64) -> FetchConfig {
    let mut cfg = FetchConfig::new(shared.download_url.clone());
    cfg.target_dir = shared.target_dir.clone();
    cfg.conditions_wait_time = Duration::from_secs(wait_time);
    cfg.progress = !shared.no_progress;
    cfg.verify = if shared.no_verify {
        TlsVerify::Disabled
    } else if let Some(bundle) = &shared.ca_bundle {
        TlsVerify::CaBundle(bundle.clone())
    } else {
        TlsVerify::Enabled
    };
    cfg
}

fn build_spec(shared: &SharedOpts) -> ImageSpec {
    let mut spec = ImageSpec::new(&shared.image_name)
        .with_arch(&shared.arch)
        .with_version_format(&shared.version_format);
    if let Some(profile) = &shared.profile {
        spec = spec.with_profile(profile);
    }
    if !shared.extensions.is_empty() {
        spec = spec.with_extensions(shared.extensions.clone());
    }
    if !shared.checksum_extensions.is_empty() {
        spec = spec.with_checksum_extensions(shared.checksum_extensions.clone());
    }
    spec
}

fn build_conditions(opts: &DownloadOpts) -> Result<Vec<Condition>> {
    let mut out = Vec::new();
    if opts.image_version.is_some() || opts.image_release.is_some() {
        out.push(conditions::parse_image_condition(
            opts.image_version.as_deref(),
            opts.image_release.as_deref(),
        )?);
    }
    for expr in &opts.packages {
        out.push(conditions::parse_package_condition(expr)?);
    }
    if let Some(expr) = &opts.expect_checksum {
        out.push(conditions::parse_checksum_condition(expr)?);
    }
    if !opts.disallow_licenses.is_empty() {
        out.push(conditions::disallowed_licenses(
            opts.disallow_licenses.clone(),
        )?);
    }
    if !opts.disallow_packages.is_empty() {
        out.push(conditions::disallowed_packages(
            opts.disallow_packages.clone(),
        )?);
    }
    Ok(out)
}

async fn resolve_candidate(listing: &ListingClient, spec: &ImageSpec) -> Result<CandidateFile> {
    let names = listing.list().await?;
    Ok(resolver::resolve(&names, spec)?)
}

async fn run_download(
    cfg: &FetchConfig,
    spec: &ImageSpec,
    opts: &DownloadOpts,
    shared: &SharedOpts,
) -> Result<()> {
    let client = remote::build_client(&cfg.verify)?;
    let listing = ListingClient::new(client.clone(), cfg.download_url.clone());
    let metadata = MetadataFetcher::new(client.clone(), cfg.download_url.clone());
    let renderer = renderer_for(shared.json);

    let mut spec = spec.clone();
    if let Some(version) = &opts.pin_version {
        spec = spec.with_explicit_version(version);
    }
    if let Some(release) = &opts.pin_release {
        spec = spec.with_explicit_release(release);
    }
    let conditions = build_conditions(opts)?;

    let poller = ConditionPoller::new(
        &listing,
        &metadata,
        &spec,
        &conditions,
        cfg.conditions_wait_time,
        cfg.poll_interval(),
    );
    let outcome = poller.run().await?;
    println!("{}", renderer.outcome(&outcome));

    match outcome {
        PollOutcome::Satisfied {
            candidate: Some(candidate),
            ..
        } => {
            let downloader =
                Downloader::new(client, cfg.download_url.clone()).with_progress(cfg.progress);
            let path = downloader
                .download(
                    &candidate,
                    &metadata,
                    &cfg.target_dir,
                    spec.checksum_extensions(),
                )
                .await?;
            println!("{}", path.display());
            Ok(())
        }
        PollOutcome::Satisfied {
            candidate: None, ..
        } => {
            bail!(
                "no image matching {:?} is published at {} yet",
                spec.base_name(),
                cfg.download_url
            )
        }
        PollOutcome::TimedOut { .. } => Err(errors::Error::Timeout {
            budget_secs: opts.conditions_wait_time,
        }
        .into()),
    }
}

async fn run_packages(
    cfg: &FetchConfig,
    spec: &ImageSpec,
    command: &PackagesCommand,
    shared: &SharedOpts,
) -> Result<()> {
    let client = remote::build_client(&cfg.verify)?;
    let listing = ListingClient::new(client.clone(), cfg.download_url.clone());
    let metadata = MetadataFetcher::new(client, cfg.download_url.clone());
    let renderer = renderer_for(shared.json);

    let candidate = resolve_candidate(&listing, spec)
        .await
        .with_context(|| format!("resolve image {:?}", spec.base_name()))?;
    let report = metadata
        .fetch_packages(&candidate)
        .await
        .with_context(|| format!("fetch packages report for {}", candidate.filename()))?;

    match command {
        PackagesCommand::List {
            filter_licenses,
            filter_packages,
        } => {
            let mut report = report;
            if !filter_licenses.is_empty() {
                report = report.with_licenses(filter_licenses);
            }
            if !filter_packages.is_empty() {
                report = report.matching_names(filter_packages)?;
            }
            if report.is_empty() {
                println!("no packages found matching criteria");
            } else {
                println!("{}", renderer.packages(&report));
            }
        }
        PackagesCommand::Show { name } => match report.get(name) {
            Some(info) => println!("{}", renderer.package(name, info)),
            None => bail!("package {name:?} not in image {}", candidate.filename()),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let spec = build_spec(&cli.shared);
    match &cli.command {
        Command::Download(opts) => {
            let cfg = build_config(&cli.shared, opts.conditions_wait_time);
            run_download(&cfg, &spec, opts, &cli.shared).await
        }
        Command::Packages { command } => {
            let cfg = build_config(&cli.shared, 0);
            run_packages(&cfg, &spec, command, &cli.shared).await
        }
    }
}
