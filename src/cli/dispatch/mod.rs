use crate::{
    api::types::FactorType,
    cli::{
        actions::{login, unlock, Action},
        commands::{
            ARG_DEVICE_FINGERPRINT, ARG_FACTOR, ARG_PASSWORD, ARG_POLL_INTERVAL, ARG_URL,
            ARG_USERNAME, CMD_LOGIN, CMD_UNLOCK,
        },
        globals::GlobalArgs,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let url = matches
        .get_one::<Url>(ARG_URL)
        .cloned()
        .context("missing required argument: --url")?;
    let poll_interval = matches
        .get_one::<u64>(ARG_POLL_INTERVAL)
        .copied()
        .unwrap_or(3);
    let globals = GlobalArgs::new(url).with_poll_interval(Duration::from_secs(poll_interval));

    match matches.subcommand() {
        Some((CMD_LOGIN, sub_m)) => Ok(Action::Login(login::Args {
            globals,
            username: required_string(sub_m, ARG_USERNAME)?,
            password: sub_m
                .get_one::<String>(ARG_PASSWORD)
                .map(|password| SecretString::from(password.clone())),
            device_fingerprint: sub_m.get_one::<String>(ARG_DEVICE_FINGERPRINT).cloned(),
        })),
        Some((CMD_UNLOCK, sub_m)) => {
            let factor = required_string(sub_m, ARG_FACTOR)?;
            let factor_type = FactorType::from_str(&factor)
                .with_context(|| format!("unsupported recovery factor: {factor}"))?;

            Ok(Action::Unlock(unlock::Args {
                globals,
                username: required_string(sub_m, ARG_USERNAME)?,
                factor_type,
            }))
        }
        _ => Err(anyhow!("missing subcommand, try --help")),
    }
}

fn required_string(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}
