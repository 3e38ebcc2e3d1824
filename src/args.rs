use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::site::SiteConfig;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether clients connect to the site over https.
    /// If so, the sessionid cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address to listen on. By default only
    /// the IPv4 loopback is used.
    #[arg(short, long)]
    address: Option<String>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 80)]
    port: u16,

    /// Where user accounts are stored.
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// The git checkout holding the site content, served under /site/.
    #[arg(long, default_value = "./MainSite")]
    content_dir: PathBuf,

    /// The remote the webhook pulls from.
    #[arg(long, default_value = "origin")]
    remote: String,

    /// Token the webhook caller must send in X-Webhook-Token.
    /// Without one, anybody who can reach /webhook can trigger a pull.
    #[arg(long)]
    webhook_secret: Option<String>,

    /// Seconds before a running pull is abandoned.
    #[arg(long, default_value_t = 60)]
    sync_timeout: u64,

    /// Lifetime of a login session.
    #[arg(long, default_value_t = 12)]
    session_hours: i64,

    /// Lifetime of a session when "remember me" is ticked.
    #[arg(long, default_value_t = 30)]
    remember_days: i64,

    /// bcrypt cost for new password hashes.
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    hash_cost: u32,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn content_dir(&self) -> &PathBuf {
        &self.content_dir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout)
    }

    pub fn site_config(&self) -> SiteConfig {
        SiteConfig {
            hash_cost: self.hash_cost,
            session_secs: self.session_hours * 60 * 60,
            remember_secs: self.remember_days * 24 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["mainsite"]);

        assert_eq!(args.addr().unwrap(), "127.0.0.1:80".parse::<SocketAddr>().unwrap());
        assert!(!args.secure());
        assert_eq!(args.content_dir(), &PathBuf::from("./MainSite"));
        assert_eq!(args.remote(), "origin");
        assert_eq!(args.webhook_secret(), None);
        assert_eq!(args.sync_timeout(), Duration::from_secs(60));

        let config = args.site_config();
        assert_eq!(config.session_secs, 12 * 3600);
        assert_eq!(config.remember_secs, 30 * 86400);
        assert_eq!(config.hash_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn flags() {
        let args = Args::parse_from([
            "mainsite",
            "--secure",
            "--address",
            "::1",
            "--port",
            "8080",
            "--webhook-secret",
            "s3cret",
            "--session-hours",
            "1",
        ]);

        assert_eq!(args.addr().unwrap(), "[::1]:8080".parse::<SocketAddr>().unwrap());
        assert!(args.secure());
        assert_eq!(args.webhook_secret(), Some("s3cret"));
        assert_eq!(args.site_config().session_secs, 3600);
    }

    #[test]
    fn bad_address() {
        let args = Args::parse_from(["mainsite", "--address", "localhost"]);
        assert!(args.addr().is_err());
    }
}
