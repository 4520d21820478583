use clap::{ArgAction, Parser};
use std::ffi::OsString;

/// Generate UUIDs (v1, v4, v6, v7) and decode JWTs.
/// Decoding never verifies the token signature: the printed claims are untrusted.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct IdkitArgs {
    /// Generates N UUID v1s (time-based, MAC address node id)
    #[clap(long = "uuidv1", value_name = "N", default_value_t = 0, value_parser = parse_count)]
    pub uuidv1: u64,

    /// Generates N UUID v4s (random)
    #[clap(long = "uuidv4", value_name = "N", default_value_t = 0, value_parser = parse_count)]
    pub uuidv4: u64,

    /// Generates N UUID v6s (time-based, sortable field order)
    #[clap(long = "uuidv6", value_name = "N", default_value_t = 0, value_parser = parse_count)]
    pub uuidv6: u64,

    /// Generates N UUID v7s (Unix-millisecond time-ordered, random)
    #[clap(long = "uuidv7", value_name = "N", default_value_t = 0, value_parser = parse_count)]
    pub uuidv7: u64,

    /// Decodes the JWT and prints its header and claims as JSON.
    /// The signature is NOT verified.
    #[clap(long = "decode-jwt", value_name = "TOKEN")]
    pub decode_jwt: Option<String>,

    /// Log what is being done to stderr (repeat for more detail)
    #[clap(long = "verbose", short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// No color output on stderr
    #[clap(long = "no-color", short = 'n')]
    pub no_color: bool,
}

/// Parses a count like Go's `strconv.ParseUint(s, 0, 64)`: decimal, `0x` hex,
/// `0o` or leading-`0` octal, `0b` binary. Underscores are allowed after a prefix.
pub fn parse_count(s: &str) -> Result<u64, String> {
    let lower = s.to_ascii_lowercase();
    let (digits, radix, prefixed) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16, true)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8, true)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2, true)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8, true)
    } else {
        (lower.as_str(), 10, false)
    };

    let digits = if prefixed {
        digits.replace('_', "")
    } else {
        digits.to_string()
    };

    if digits.is_empty() || digits.starts_with('+') {
        return Err(format!("invalid count '{}'", s));
    }

    u64::from_str_radix(&digits, radix).map_err(|err| format!("invalid count '{}': {}", s, err))
}

/// Long names that may also be spelled with a single leading dash.
const LONG_FLAGS: &[&str] = &[
    "uuidv1",
    "uuidv4",
    "uuidv6",
    "uuidv7",
    "decode-jwt",
    "verbose",
    "no-color",
    "help",
    "version",
];

/// Long names whose value is the following argument unless given as `name=value`.
const VALUE_FLAGS: &[&str] = &["uuidv1", "uuidv4", "uuidv6", "uuidv7", "decode-jwt"];

/// Rewrites `-name` / `-name=value` into clap's `--name` form for known long flags.
///
/// The program name, values of value-taking flags, unknown names and anything
/// after a bare `--` pass through unchanged.
pub fn normalize_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut normalized: Vec<OsString> = args.next().into_iter().collect();
    let mut passthrough = false;
    let mut value_next = false;

    for arg in args {
        if passthrough || value_next {
            value_next = false;
            normalized.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            normalized.push(arg);
            continue;
        };

        if text == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        let name = text.trim_start_matches('-');
        let dashes = text.len() - name.len();
        let (name, has_value) = match name.split_once('=') {
            Some((name, _)) => (name, true),
            None => (name, false),
        };

        if !(1..=2).contains(&dashes) || !LONG_FLAGS.contains(&name) {
            normalized.push(arg);
            continue;
        }

        value_next = !has_value && VALUE_FLAGS.contains(&name);
        if dashes == 1 {
            normalized.push(format!("-{}", text).into());
        } else {
            normalized.push(arg);
        }
    }

    normalized
}
