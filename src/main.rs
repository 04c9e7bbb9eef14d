use tracing_subscriber::{EnvFilter, fmt};
use tracing::{info, warn};

use tripsync::identity::{AuthOutcome, SessionEvent};
use tripsync::notice::NoticeLevel;
use tripsync::{ClientConfig, TripClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = ClientConfig::from_env()?;
    info!(
        target: "startup",
        "tripsync starting: api='{}', ws='{}', restore_timeout={:?}, credential_file={:?}",
        config.api_url, config.ws_url, config.restore_timeout, config.credential_file
    );

    let client = TripClient::new(&config)?;
    let mut events = client.state().subscribe();
    let mut notices = client.notices().subscribe();
    let mut revisions = client.notifications().watch();

    let status = client.boot().await;
    info!(target: "startup", "session after boot: {:?}", status);

    if !client.state().snapshot().authenticated() {
        if let (Ok(user), Ok(pass)) = (std::env::var("TRIPSYNC_USER"), std::env::var("TRIPSYNC_PASSWORD")) {
            match client.session().login(&user, &pass).await {
                AuthOutcome::Success => info!(target: "startup", "signed in as {}", user),
                AuthOutcome::Failed { message } => warn!(target: "startup", "sign-in failed: {}", message),
            }
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = events.recv() => match ev {
                Ok(SessionEvent::ForcedLogout { reason }) => warn!(target: "session", "signed out: {}", reason),
                Ok(ev) => info!(target: "session", "{:?}", ev),
                Err(_) => {}
            },
            n = notices.recv() => if let Ok(n) = n {
                match n.level {
                    NoticeLevel::Alert | NoticeLevel::Error => warn!(target: "notice", "{}", n.text),
                    _ => info!(target: "notice", "{}", n.text),
                }
            },
            changed = revisions.changed() => {
                if changed.is_err() { break; }
                let snap = client.notifications().snapshot();
                let latest = snap.items().next().map(|n| (n.kind, n.title.clone()));
                if let Some((kind, title)) = latest {
                    info!(target: "notifications", "[{:?}] {} ({} unread)", kind, title, snap.unread_count());
                }
            }
        }
    }

    client.channel().close();
    Ok(())
}
