//! Lumigate diagnostic tool
//!
//! Connects to a gateway's maintenance shell and dumps device facts, the
//! process list or a backup archive of the data partition.

use anyhow::{bail, Context, Result};
use lumigate::{ntp, ShellSession};
use tracing::info;

const USAGE: &str = "usage: lumigate <host> <info|ps|tar|ntp>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(host), Some(command)) = (args.next(), args.next()) else {
        bail!("{}", USAGE);
    };

    match command.as_str() {
        "ntp" => {
            let time = ntp::query(&host).await;
            if time == 0.0 {
                bail!("no NTP answer from {}", host);
            }
            println!("{:.3}", time);
        }
        "info" => {
            let mut session = connect(&host).await?;
            println!("version:  {}", session.version());
            println!("token:    {}", session.token().await?);
            println!("did:      {}", session.device_id().await?);
            println!("wlan mac: {}", session.wlan_mac().await?);
            println!("zigbee db: {}", session.zigbee_db());
            session.close().await?;
        }
        "ps" => {
            let mut session = connect(&host).await?;
            print!("{}", session.running_processes().await?);
            session.close().await?;
        }
        "tar" => {
            let mut session = connect(&host).await?;
            info!("downloading data archive from {}", host);
            let archive = session.tar_data().await?;
            let path = format!("{}-data.tar.gz", host);
            tokio::fs::write(&path, &archive)
                .await
                .with_context(|| format!("writing {}", path))?;
            println!("{} ({} bytes)", path, archive.len());
            session.close().await?;
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }

    Ok(())
}

async fn connect(host: &str) -> Result<ShellSession<lumigate::telnet::TcpTransport>> {
    info!("connecting to {}", host);
    ShellSession::connect(host)
        .await
        .with_context(|| format!("opening shell session to {}", host))
}
