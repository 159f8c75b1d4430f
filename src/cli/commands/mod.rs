pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use url::Url;

pub const ARG_URL: &str = "url";
pub const ARG_POLL_INTERVAL: &str = "poll-interval";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_DEVICE_FINGERPRINT: &str = "device-fingerprint";
pub const ARG_FACTOR: &str = "factor";

pub const CMD_LOGIN: &str = "login";
pub const CMD_UNLOCK: &str = "unlock";

fn username_arg() -> Arg {
    Arg::new(ARG_USERNAME)
        .short('u')
        .long("username")
        .help("Account to authenticate")
        .env("AUTHN_USERNAME")
        .required(true)
}

fn login() -> Command {
    Command::new(CMD_LOGIN)
        .about("Run an authentication transaction and print the session token")
        .arg(username_arg())
        .arg(
            Arg::new(ARG_PASSWORD)
                .long("password")
                .help("Password, prompted for when absent")
                .env("AUTHN_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DEVICE_FINGERPRINT)
                .long("device-fingerprint")
                .help("Value sent in the X-Device-Fingerprint header")
                .env("AUTHN_DEVICE_FINGERPRINT"),
        )
}

fn unlock() -> Command {
    Command::new(CMD_UNLOCK)
        .about("Start a self-service account unlock")
        .arg(username_arg())
        .arg(
            Arg::new(ARG_FACTOR)
                .short('f')
                .long("factor")
                .help("Recovery factor used to deliver the unlock message")
                .env("AUTHN_UNLOCK_FACTOR")
                .default_value("email")
                .value_parser(["sms", "call", "email"]),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("authn")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_URL)
                .long("url")
                .help("Identity provider base URL, example: https://idp.example.com")
                .env("AUTHN_URL")
                .global(true)
                .value_parser(clap::value_parser!(Url)),
        )
        .arg(
            Arg::new(ARG_POLL_INTERVAL)
                .long("poll-interval")
                .help("Seconds between push verification polls")
                .env("AUTHN_POLL_INTERVAL")
                .global(true)
                .default_value("3")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .subcommand(login())
        .subcommand(unlock());

    logging::with_args(command)
}
