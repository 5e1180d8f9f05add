mod config;

use abi::{LoadParams, LoadRequest, Outcome, LAYOUT_VERSION};
use anyhow::{anyhow, bail, Context, Result};
use config::{load_config, CONFIG_FILE};
use libloading::{Library, Symbol};
use log::{debug, error, info};
use std::path::{Path, PathBuf};

type LoadAndCallMethodFn = unsafe extern "C" fn(*const LoadParams) -> i32;

const USAGE: &str = "usage: dnhost <assembly> <type-path> [method] [--bootstrap <path>] [--data <text>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    assembly: PathBuf,
    type_path: String,
    method: Option<String>,
    bootstrap: Option<PathBuf>,
    data: Option<String>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut positional = Vec::new();
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--bootstrap" => {
                    let value = args.next().ok_or_else(|| anyhow!("--bootstrap needs a path"))?;
                    parsed.bootstrap = Some(PathBuf::from(value));
                }
                "--data" => {
                    parsed.data = Some(args.next().ok_or_else(|| anyhow!("--data needs a value"))?);
                }
                flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        parsed.assembly = positional.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?;
        parsed.type_path = positional.next().ok_or_else(|| anyhow!(USAGE))?;
        parsed.method = positional.next();
        if let Some(extra) = positional.next() {
            bail!("unexpected argument {}\n{}", extra, USAGE);
        }
        Ok(parsed)
    }
}

/// Loads the bootstrap into this process and calls it with `request`.
fn call_bootstrap(bootstrap: &Path, request: &LoadRequest, data: Option<&mut [u8]>) -> Result<i32> {
    unsafe {
        let lib = Library::new(bootstrap).with_context(|| format!("Failed to load bootstrap {:?}", bootstrap))?;
        let load_and_call: Symbol<LoadAndCallMethodFn> = lib
            .get(b"LoadAndCallMethod")
            .context("Bootstrap does not export LoadAndCallMethod")?;
        let load_and_call = *load_and_call;

        let block = request.block(data);
        debug!("Parameter block (layout v{}): {:?}", LAYOUT_VERSION, block.params());
        let code = load_and_call(block.as_ptr());

        // The runtime now lives in this process; keep its host library mapped.
        std::mem::forget(lib);
        Ok(code)
    }
}

fn run() -> Result<i32> {
    let args = Args::parse(std::env::args().skip(1))?;
    let config = load_config(Path::new(CONFIG_FILE))?;

    let method = args.method.clone().unwrap_or_else(|| config.default_method.clone());
    let bootstrap = args.bootstrap.clone().unwrap_or_else(|| config.bootstrap_path());
    if !bootstrap.is_file() {
        bail!("Could not find the bootstrap library at {:?}", bootstrap);
    }

    let request = LoadRequest::for_assembly(&args.assembly, &args.type_path, &method)?;
    let mut data = args.data.map(String::into_bytes);

    info!("Calling {}::{} in {:?}", args.type_path, method, args.assembly);
    let code = call_bootstrap(&bootstrap, &request, data.as_deref_mut())?;

    match Outcome::from_raw(code) {
        Outcome::Completed(result) => {
            info!("Managed method returned {}", result);
            Ok(result)
        }
        Outcome::Failed(status) => {
            error!("Bootstrap failed with {:?} ({}): {}", status, code, status.description());
            Ok(1)
        }
    }
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_minimal() {
        let parsed = args(&["Implant.dll", "Implant.DllMain, Implant"]).unwrap();
        assert_eq!(parsed.assembly, PathBuf::from("Implant.dll"));
        assert_eq!(parsed.type_path, "Implant.DllMain, Implant");
        assert_eq!(parsed.method, None);
        assert_eq!(parsed.bootstrap, None);
    }

    #[test]
    fn test_parse_options_anywhere() {
        let parsed = args(&[
            "--data",
            "hello",
            "Implant.dll",
            "Implant.DllMain, Implant",
            "Start",
            "--bootstrap",
            "out/dotnet_bootstrap.dll",
        ])
        .unwrap();
        assert_eq!(parsed.method.as_deref(), Some("Start"));
        assert_eq!(parsed.data.as_deref(), Some("hello"));
        assert_eq!(parsed.bootstrap, Some(PathBuf::from("out/dotnet_bootstrap.dll")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(args(&["Implant.dll"]).is_err());
        assert!(args(&["a.dll", "A.B, A", "Main", "extra"]).is_err());
        assert!(args(&["a.dll", "A.B, A", "--bootstrap"]).is_err());
        assert!(args(&["a.dll", "A.B, A", "--verbose"]).is_err());
    }
}
