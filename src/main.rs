use std::env;
use std::ffi::CString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use fuser::MountOption;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rdmfs::api_client::OsfClient;
use rdmfs::config::{CacheConfig, MountConfig};
use rdmfs::fs::RdmFs;
use rdmfs::whitelist::Whitelist;

#[derive(Parser, Debug)]
#[command(name = "rdmfs", about = "Mount a remote RDM service as a filesystem")]
struct Args {
    /// Where to mount the file system
    mountpoint: PathBuf,

    /// Enable debugging output
    #[arg(long)]
    debug: bool,

    /// Enable FUSE debugging output
    #[arg(long)]
    debug_fuse: bool,

    /// Enable the allow_other mount option
    #[arg(long)]
    allow_other: bool,

    /// OSF username; provide the password via the OSF_PASSWORD environment
    /// variable
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// OSF API URL (default is https://api.osf.io/v2/)
    #[arg(long)]
    base_url: Option<String>,

    /// OSF project ID
    #[arg(short = 'p', long, conflicts_with = "all_projects")]
    project: Option<String>,

    /// Mount all accessible projects under the root directory
    #[arg(long)]
    all_projects: bool,

    /// Mode of files
    #[arg(long, default_value = "0644")]
    file_mode: String,

    /// Mode of directories
    #[arg(long, default_value = "0755")]
    dir_mode: String,

    /// Owner (name or uid) of files; defaults to the current user
    #[arg(long)]
    owner: Option<String>,

    /// Group (name or gid) of files; defaults to the current group
    #[arg(long)]
    group: Option<String>,

    /// File listing the writable paths; everything else mounts read-only
    #[arg(long)]
    writable_whitelist: Option<PathBuf>,
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "rdmfs=debug" } else { "rdmfs=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse_mode(mode: &str) -> Result<u16, String> {
    let digits = mode
        .strip_prefix('0')
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| format!("unexpected mode: {mode}"))?;
    u16::from_str_radix(digits, 8).map_err(|_| format!("unexpected mode: {mode}"))
}

fn resolve_uid(owner: Option<&str>) -> Result<u32, String> {
    let Some(owner) = owner else {
        // Reading the process uid cannot fail.
        return Ok(unsafe { libc::getuid() });
    };
    if let Ok(uid) = owner.parse() {
        return Ok(uid);
    }
    let name = CString::new(owner).map_err(|_| format!("unexpected owner: {owner}"))?;
    // getpwnam is only called during single-threaded startup.
    let record = unsafe { libc::getpwnam(name.as_ptr()) };
    if record.is_null() {
        return Err(format!("unknown owner: {owner}"));
    }
    Ok(unsafe { (*record).pw_uid })
}

fn resolve_gid(group: Option<&str>) -> Result<u32, String> {
    let Some(group) = group else {
        return Ok(unsafe { libc::getgid() });
    };
    if let Ok(gid) = group.parse() {
        return Ok(gid);
    }
    let name = CString::new(group).map_err(|_| format!("unexpected group: {group}"))?;
    let record = unsafe { libc::getgrnam(name.as_ptr()) };
    if record.is_null() {
        return Err(format!("unknown group: {group}"));
    }
    Ok(unsafe { (*record).gr_gid })
}

fn build_mount_config(args: &Args) -> Result<MountConfig, String> {
    Ok(MountConfig {
        file_mode: parse_mode(&args.file_mode)?,
        dir_mode: parse_mode(&args.dir_mode)?,
        uid: resolve_uid(args.owner.as_deref())?,
        gid: resolve_gid(args.group.as_deref())?,
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    if !args.all_projects && args.project.is_none() {
        // Same exit code clap uses for its own usage errors.
        Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "either --project or --all-projects must be specified",
            )
            .exit();
    }

    let mount = match build_mount_config(&args) {
        Ok(mount) => mount,
        Err(message) => {
            error!("{message}");
            return ExitCode::from(2);
        }
    };

    let whitelist = match &args.writable_whitelist {
        Some(path) => match Whitelist::load(path) {
            Ok(whitelist) => Some(whitelist),
            Err(err) => {
                error!("could not read whitelist {}: {err}", path.display());
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let password = env::var("OSF_PASSWORD").ok();
    let client = match OsfClient::new(args.base_url.as_deref(), args.username.clone(), password) {
        Ok(client) => client,
        Err(err) => {
            error!("invalid base URL: {err}");
            return ExitCode::from(2);
        }
    };

    let filesystem = match RdmFs::new(
        client,
        args.project.clone(),
        args.all_projects,
        CacheConfig::load(),
        mount,
        whitelist,
    ) {
        Ok(filesystem) => filesystem,
        Err(err) => {
            error!("could not initialize filesystem: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![
        MountOption::FSName("rdmfs".to_owned()),
        MountOption::AutoUnmount,
    ];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }
    if args.debug_fuse {
        options.push(MountOption::CUSTOM("debug".to_owned()));
    }

    info!("mounting at {}", args.mountpoint.display());
    match fuser::mount2(filesystem, &args.mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("FUSE error: {err}");
            ExitCode::FAILURE
        }
    }
}
