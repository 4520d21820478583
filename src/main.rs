mod cli;
mod jwt;
mod logger;
mod uuid_gen;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use cli::{normalize_args, IdkitArgs};
use colored::Colorize;
use jwt::Jwt;
use log::{debug, info};
use std::io::{self, Write};
use std::process::ExitCode;
use uuid_gen::{Generator, UuidVersion};

fn generate_uuids(requested: &[(u8, u64)]) -> anyhow::Result<()> {
    let generator = Generator::new().context("Failed to initialize UUID generator")?;
    let mut out = io::stdout().lock();

    for &(number, count) in requested {
        if count == 0 {
            continue;
        }
        let version = UuidVersion::try_from(number)?;
        generator
            .write_uuids(&mut out, version, count)
            .with_context(|| format!("Failed to generate {}", version))?;
    }

    out.flush()?;
    Ok(())
}

fn decode_jwt(token: &str) -> anyhow::Result<()> {
    let jwt = token.parse::<Jwt>().context("Failed to decode JWT")?;
    let json = jwt.to_pretty_json()?;

    info!(
        "signature {:?} was not verified, claims are untrusted",
        jwt.signature.encoded
    );

    writeln!(io::stdout().lock(), "{}", json)?;
    Ok(())
}

fn run(args: IdkitArgs) -> anyhow::Result<()> {
    let requested = [
        (1, args.uuidv1),
        (4, args.uuidv4),
        (6, args.uuidv6),
        (7, args.uuidv7),
    ];

    if requested.iter().any(|&(_, count)| count > 0) {
        generate_uuids(&requested)?;
    }

    match args.decode_jwt.as_deref() {
        Some(token) if !token.is_empty() => decode_jwt(token)?,
        _ => debug!("no token to decode"),
    }

    Ok(())
}

fn main() -> ExitCode {
    let argv = normalize_args(std::env::args_os());

    if argv.len() <= 1 {
        return match IdkitArgs::command().print_long_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }

    let args = IdkitArgs::parse_from(argv);

    if args.no_color {
        colored::control::set_override(false);
    }

    if let Err(err) = logger::initialize(args.verbose, !args.no_color) {
        eprintln!("{} {}", "warning:".yellow().bold(), err);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
