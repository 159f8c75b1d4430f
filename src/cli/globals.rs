use crate::authn::DEFAULT_POLL_INTERVAL;
use std::time::Duration;
use url::Url;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub url: Url,
    pub poll_interval: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
