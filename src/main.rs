//! Android Kernel Builder CLI
//!
//! Compiles a device kernel out-of-tree with clang, packages the image into
//! an AnyKernel3 flashable zip and optionally reports progress to a Telegram
//! chat.
//!
//! # Usage
//!
//! ```bash
//! export CLANG_PATH=~/toolchains/clang DEVICE=ginkgo
//!
//! # Configure, compile and package (default)
//! droidkbuild
//!
//! # Apply the defconfig only
//! droidkbuild config
//!
//! # Wipe out/ and build from scratch
//! droidkbuild rebuild
//!
//! # Package an already compiled image
//! droidkbuild zip
//!
//! # Reset AnyKernel3, drop old zips, package again
//! droidkbuild repack
//!
//! # Show configuration and artifact status
//! droidkbuild status
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use droidkbuild::artifact;
use droidkbuild::build::kernel;
use droidkbuild::config::{self, BuildConfig, TelegramConfig};
use droidkbuild::preflight::{PreflightChecker, Scope};
use droidkbuild::telegram::{self, BuildInfo, Notifier};
use droidkbuild::timing::format_duration;
use droidkbuild::toolchain::Toolchain;
use droidkbuild::{git, rebuild, Timer};

#[derive(Parser)]
#[command(name = "droidkbuild")]
#[command(author, version, about = "Android kernel builder", long_about = None)]
struct Cli {
    #[command(flatten)]
    opts: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove build products (make clean + mrproper, delete the output dir)
    Clean,

    /// Apply the device defconfig to the output dir
    Config,

    /// Configure if needed, compile, package and notify (default)
    Build {
        /// Skip packaging the flashable zip
        #[arg(long)]
        no_zip: bool,
    },

    /// Clean, then build from scratch
    Rebuild {
        /// Skip packaging the flashable zip
        #[arg(long)]
        no_zip: bool,
    },

    /// Package the compiled image into an AnyKernel3 zip
    Zip,

    /// Reset AnyKernel3, remove old zips and package again
    Repack,

    /// Show configuration, toolchain and artifact status
    Status,
}

#[derive(Args)]
struct Options {
    /// Kernel source tree
    #[arg(long, global = true, env = "KERNEL_DIR", default_value = ".")]
    kernel_dir: PathBuf,

    /// Build output directory (relative to the kernel tree)
    #[arg(long, global = true, env = "OUT_DIR", default_value = config::DEFAULT_OUT_DIR)]
    out_dir: PathBuf,

    /// Device codename
    #[arg(short, long, global = true, env = "DEVICE")]
    device: Option<String>,

    /// Defconfig name (default: <device>_defconfig)
    #[arg(long, global = true, env = "DEFCONFIG")]
    defconfig: Option<String>,

    /// Target architecture
    #[arg(long, global = true, default_value = config::DEFAULT_ARCH)]
    arch: String,

    /// make program
    #[arg(long, global = true, env = "MAKE", default_value = "make")]
    make: String,

    /// Parallel make jobs (default: CPU count)
    #[arg(short, long, global = true, env = "JOBS")]
    jobs: Option<usize>,

    /// Kernel name used in zip names and notifications
    #[arg(long, global = true, env = "KERNEL_NAME", default_value = config::DEFAULT_KERNEL_NAME)]
    kernel_name: String,

    /// AnyKernel3 template repository
    #[arg(
        long,
        global = true,
        env = "ANYKERNEL_REPO",
        default_value = config::DEFAULT_ANYKERNEL_REPO
    )]
    anykernel_repo: String,

    /// AnyKernel3 branch
    #[arg(
        long,
        global = true,
        env = "ANYKERNEL_BRANCH",
        default_value = config::DEFAULT_ANYKERNEL_BRANCH
    )]
    anykernel_branch: String,

    /// AnyKernel3 checkout (default: <kernel-dir>/AnyKernel3)
    #[arg(long, global = true)]
    anykernel_dir: Option<PathBuf>,

    /// Where finished zips go (default: kernel tree)
    #[arg(long, global = true)]
    zip_dir: Option<PathBuf>,

    /// Clang toolchain root (contains bin/clang)
    #[arg(long, global = true, env = "CLANG_PATH")]
    clang_path: Option<PathBuf>,

    /// GNU cross toolchain root (contains bin/aarch64-linux-*-gcc)
    #[arg(long, global = true, env = "GCC_PATH")]
    gcc_path: Option<PathBuf>,

    /// Send Telegram notifications (1/0, true/false, yes/no, on/off)
    #[arg(
        long,
        global = true,
        env = "ENABLE_TELEGRAM",
        value_parser = config::parse_toggle,
        action = ArgAction::Set,
        default_value = "0"
    )]
    telegram: bool,

    /// Telegram bot token
    #[arg(long, global = true, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Telegram chat id
    #[arg(long, global = true, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Everything a command needs, resolved from the CLI.
struct Settings {
    config: BuildConfig,
    clang_path: Option<PathBuf>,
    gcc_path: Option<PathBuf>,
    telegram: TelegramConfig,
}

impl Settings {
    fn from_options(opts: Options) -> Result<Self> {
        let kernel_dir = if opts.kernel_dir.is_absolute() {
            opts.kernel_dir
        } else {
            std::env::current_dir()
                .context("Failed to read current directory")?
                .join(&opts.kernel_dir)
        };
        let Some(device) = opts.device else {
            anyhow::bail!("No device set. Pass --device <codename> or set DEVICE.");
        };

        let mut config = BuildConfig::new(kernel_dir, device);
        config.out_dir = config.resolve(&opts.out_dir);
        if let Some(defconfig) = opts.defconfig {
            config.defconfig = defconfig;
        }
        config.arch = opts.arch;
        config.make = opts.make;
        if let Some(jobs) = opts.jobs {
            config.jobs = jobs;
        }
        config.kernel_name = opts.kernel_name;
        config.anykernel_repo = opts.anykernel_repo;
        config.anykernel_branch = opts.anykernel_branch;
        if let Some(dir) = opts.anykernel_dir {
            config.anykernel_dir = config.resolve(&dir);
        }
        if let Some(dir) = opts.zip_dir {
            config.zip_dir = config.resolve(&dir);
        }
        config.validate()?;

        Ok(Self {
            config,
            clang_path: opts.clang_path,
            gcc_path: opts.gcc_path,
            telegram: TelegramConfig {
                enabled: opts.telegram,
                bot_token: opts.telegram_token,
                chat_id: opts.telegram_chat_id,
            },
        })
    }

    fn toolchain(&self) -> Result<Toolchain> {
        Toolchain::resolve(self.clang_path.as_deref(), self.gcc_path.as_deref())
    }

    fn checker(&self) -> PreflightChecker {
        PreflightChecker::new(
            self.config.clone(),
            self.clang_path.clone(),
            self.gcc_path.clone(),
            self.telegram.enabled,
        )
    }

    /// Run preflight for `scope`, failing on any required check.
    async fn preflight(&self, scope: Scope) -> Result<()> {
        let report = self.checker().run(scope).await;
        if !report.is_ok() {
            report.print_summary();
            anyhow::bail!("{} preflight check(s) failed", report.errors().len());
        }
        for check in report.checks.iter().filter(|c| c.warning) {
            println!("[WARN] {}: {}", check.name, check.message);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.opts.verbose);

    let command = cli.command.unwrap_or(Commands::Build { no_zip: false });
    let result = match Settings::from_options(cli.opts) {
        Ok(settings) => match command {
            Commands::Clean => cmd_clean(&settings),
            Commands::Config => cmd_config(&settings),
            Commands::Build { no_zip } => cmd_build(&settings, no_zip).await,
            Commands::Rebuild { no_zip } => cmd_rebuild(&settings, no_zip).await,
            Commands::Zip => cmd_zip(&settings).await,
            Commands::Repack => cmd_repack(&settings).await,
            Commands::Status => cmd_status(&settings).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn cmd_clean(settings: &Settings) -> Result<()> {
    println!("=== Cleaning {} ===\n", settings.config.out_dir.display());
    let t = Timer::start("Clean");
    kernel::clean(&settings.config)?;
    t.finish();
    Ok(())
}

fn cmd_config(settings: &Settings) -> Result<()> {
    let config = &settings.config;
    println!("=== Configuring {} ===\n", config.device);

    let toolchain = settings.toolchain()?;
    kernel::configure(config, &toolchain)?;

    println!("\n=== Config complete ===");
    println!("  .config: {}", config.dot_config().display());
    Ok(())
}

async fn cmd_build(settings: &Settings, no_zip: bool) -> Result<()> {
    let config = &settings.config;
    println!("=== {} build for {} ===\n", config.kernel_name, config.device);

    settings.preflight(Scope::Build).await?;
    let toolchain = settings.toolchain()?;
    let notifier = Notifier::new(&settings.telegram);

    let info = BuildInfo {
        kernel_name: config.kernel_name.clone(),
        device: config.device.clone(),
        defconfig: config.defconfig.clone(),
        jobs: config.jobs,
        compiler: toolchain.clang_version(),
        commit: git::head_commit(&config.kernel_dir),
        commit_subject: git::head_subject(&config.kernel_dir),
        branch: git::current_branch(&config.kernel_dir),
    };
    if let Some(compiler) = &info.compiler {
        println!("Compiler: {}", compiler);
    }
    notifier
        .send_message(&telegram::build_started_message(&info))
        .await;

    let start = Instant::now();
    let stages = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || run_build_stages(&config, &toolchain, no_zip))
            .await
            .context("Build task aborted")?
    };
    let elapsed = start.elapsed();

    match stages {
        Ok(zip) => {
            let zip_name = zip.as_deref().and_then(file_name);
            println!("\n=== Build Complete ({}) ===", format_duration(elapsed));
            if let Some(image) = kernel::find_image(config) {
                println!("  Image: {}", image.image.display());
            }
            if let Some(zip) = &zip {
                println!("  Zip:   {}", zip.display());
            }

            notifier
                .send_message(&telegram::build_succeeded_message(
                    &config.device,
                    elapsed,
                    zip_name.as_deref(),
                ))
                .await;
            if let Some(zip) = &zip {
                notifier.send_document(zip, &zip_caption(config)).await;
            }
            Ok(())
        }
        Err(e) => {
            notifier
                .send_message(&telegram::build_failed_message(
                    &config.device,
                    elapsed,
                    &format!("{:#}", e),
                ))
                .await;
            notifier
                .send_document(&config.build_log(), "Build log")
                .await;
            Err(e)
        }
    }
}

/// Configure (when stale), compile and optionally package.
fn run_build_stages(
    config: &BuildConfig,
    toolchain: &Toolchain,
    no_zip: bool,
) -> Result<Option<PathBuf>> {
    kernel::reset_log(config)?;

    if rebuild::config_needs_apply(config) {
        println!("Applying {}...", config.defconfig);
        let t = Timer::start("Config");
        kernel::configure(config, toolchain)?;
        t.finish();
    } else {
        println!("[SKIP] .config up to date with {}", config.defconfig);
    }

    println!("\nCompiling kernel...");
    let t = Timer::start("Compile");
    let image = kernel::compile(config, toolchain)?;
    t.finish();
    println!("  Image: {}", image.name());
    if let Some(release) = kernel::kernel_release(config) {
        println!("  Release: {}", release);
    }

    if no_zip {
        println!("\n[SKIP] Packaging (--no-zip)");
        return Ok(None);
    }

    println!("\nPackaging flashable zip...");
    let t = Timer::start("Zip");
    let zip = artifact::create_zip(config)?;
    t.finish();
    Ok(Some(zip))
}

async fn cmd_rebuild(settings: &Settings, no_zip: bool) -> Result<()> {
    cmd_clean(settings)?;
    println!();
    cmd_build(settings, no_zip).await
}

async fn cmd_zip(settings: &Settings) -> Result<()> {
    let config = &settings.config;
    println!("=== Packaging {} for {} ===\n", config.kernel_name, config.device);
    settings.preflight(Scope::Package).await?;

    let latest = artifact::latest_zip(config);
    if let (Some(image), Some(zip)) = (kernel::find_image(config), &latest) {
        if !rebuild::zip_is_stale(&image.image, Some(zip)) {
            println!("[SKIP] {} is newer than the kernel image", zip.display());
            println!("  Use 'repack' to force a new zip");
            return Ok(());
        }
    }

    let t = Timer::start("Zip");
    let zip = artifact::create_zip(config)?;
    t.finish();
    announce_zip(settings, &zip).await;
    Ok(())
}

async fn cmd_repack(settings: &Settings) -> Result<()> {
    let config = &settings.config;
    println!("=== Repacking {} for {} ===\n", config.kernel_name, config.device);
    settings.preflight(Scope::Package).await?;

    let t = Timer::start("Repack");
    let zip = artifact::repack(config)?;
    t.finish();
    announce_zip(settings, &zip).await;
    Ok(())
}

/// Print the zip location and upload it when notifications are on.
async fn announce_zip(settings: &Settings, zip: &Path) {
    println!("\n=== Zip ready ===");
    println!("  {}", zip.display());
    if let Ok(meta) = std::fs::metadata(zip) {
        println!("  Size: {} KB", meta.len() / 1024);
    }

    let notifier = Notifier::new(&settings.telegram);
    notifier
        .send_document(zip, &zip_caption(&settings.config))
        .await;
}

fn zip_caption(config: &BuildConfig) -> String {
    let mut caption = format!(
        "<b>{}</b> for <code>{}</code>",
        telegram::escape_html(&config.kernel_name),
        telegram::escape_html(&config.device)
    );
    if let Some(release) = kernel::kernel_release(config) {
        caption.push_str(&format!("\n<code>{}</code>", telegram::escape_html(&release)));
    }
    caption
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

async fn cmd_status(settings: &Settings) -> Result<()> {
    let config = &settings.config;

    println!("Kernel Builder Status");
    println!("=====================");
    println!();
    println!("Configuration:");
    println!("  Kernel name: {}", config.kernel_name);
    println!("  Device:      {}", config.device);
    println!("  Defconfig:   {}", config.defconfig);
    println!("  Arch:        {}", config.arch);
    println!("  Jobs:        {}", config.jobs);
    println!("  Source:      {}", config.kernel_dir.display());
    println!("  Output:      {}", config.out_dir.display());
    println!("  AnyKernel3:  {}", config.anykernel_dir.display());
    println!();

    println!("Toolchain:");
    match settings.toolchain() {
        Ok(tc) => {
            println!("  Clang:       {}", tc.clang_bin.display());
            if let Some(version) = tc.clang_version() {
                println!("  Version:     {}", version);
            }
            match (&tc.gcc_bin, &tc.gcc_prefix) {
                (Some(bin), Some(prefix)) => {
                    println!("  GCC:         {} ({})", bin.display(), prefix)
                }
                _ => println!("  GCC:         not set (LLVM binutils)"),
            }
        }
        Err(e) => println!("  NOT USABLE: {}", e.to_string().lines().next().unwrap_or("")),
    }
    println!();

    println!("Source:");
    match git::head_commit(&config.kernel_dir) {
        Some(commit) => println!(
            "  Commit:      {} {}",
            commit,
            git::head_subject(&config.kernel_dir).unwrap_or_default()
        ),
        None => println!("  Commit:      (not a git checkout)"),
    }
    println!();

    println!("Build Artifacts:");
    if config.dot_config().exists() {
        let stale = rebuild::config_needs_apply(config);
        println!(
            "  .config:     PRESENT{}",
            if stale { " (defconfig changed)" } else { "" }
        );
    } else {
        println!("  .config:     NOT GENERATED");
    }
    let image = kernel::find_image(config);
    match &image {
        Some(image) => {
            let size = std::fs::metadata(&image.image)
                .map(|m| m.len() / 1024 / 1024)
                .unwrap_or(0);
            println!("  Image:       {} ({} MB)", image.name(), size);
            if let Some(release) = kernel::kernel_release(config) {
                println!("  Release:     {}", release);
            }
        }
        None => println!("  Image:       NOT BUILT"),
    }
    let latest = artifact::latest_zip(config);
    match &latest {
        Some(zip) => println!("  Zip:         {}", zip.display()),
        None => println!("  Zip:         NOT PACKAGED"),
    }
    println!();

    println!("Telegram:");
    let notifier = Notifier::new(&settings.telegram);
    println!(
        "  Notifications: {}",
        if notifier.is_enabled() { "ENABLED" } else { "DISABLED" }
    );
    println!();

    let report = settings.checker().run_all().await;
    report.print_summary();
    println!();

    println!("Next steps:");
    if !report.is_ok() {
        println!("  1. Fix the failing preflight checks above");
    } else if !config.dot_config().exists() {
        println!("  1. Run 'droidkbuild config' to apply {}", config.defconfig);
    } else if image.is_none() {
        println!("  1. Run 'droidkbuild build' to compile the kernel");
    } else if latest.is_none() {
        println!("  1. Run 'droidkbuild zip' to package the kernel");
    } else {
        println!("  Zip ready! Flash it from recovery.");
    }

    Ok(())
}
