use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use hashd::ServiceConfig;

/// Runtime configuration for the `hashd-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults that match the reference
/// deployment: port 5000 and a five second digest delay.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hashd-server",
    version,
    about = "An HTTP service for deferred SHA-512 password digests"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Example: "0.0.0.0:5000" or "127.0.0.1:8080"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:5000"))]
    pub server_addr: String,

    /// Delay in milliseconds before a submitted password is digested.
    ///
    /// Lookups for a job return `404` until this delay has elapsed and the
    /// digest has been stored.
    ///
    /// Environment variable: `HASH_DELAY_MS`
    #[arg(long, env = "HASH_DELAY_MS", default_value_t = 5_000)]
    pub hash_delay_ms: u64,

    /// Upper bound in seconds on waiting for outstanding digest workers
    /// after the last in-flight request has drained.
    ///
    /// Workers still running at the deadline race with process exit and
    /// their results are lost.
    ///
    /// Environment variable: `DRAIN_TIMEOUT_SECS`
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub service: ServiceConfig,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        if args.drain_timeout_secs == 0 {
            bail!("DRAIN_TIMEOUT_SECS must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            service: ServiceConfig {
                hash_delay: Duration::from_millis(args.hash_delay_ms),
                drain_timeout: Duration::from_secs(args.drain_timeout_secs),
            },
        })
    }
}

impl ServerConfig {
    /// Describes a drain timeout too short to cover one digest delay, in
    /// which case jobs submitted right before shutdown may be lost.
    pub fn drain_warning(&self) -> Option<String> {
        let hash_delay = self.service.hash_delay;
        let drain_timeout = self.service.drain_timeout;
        (drain_timeout <= hash_delay).then(|| {
            format!(
                "DRAIN_TIMEOUT_SECS ({drain_timeout:?}) does not exceed HASH_DELAY_MS \
                 ({hash_delay:?}); jobs submitted right before shutdown may be lost"
            )
        })
    }
}
