//! The cooperative run loop: each tick interleaves heartbeat emission, modem
//! polling, screening, and hangup in a single control flow. Cancellation is
//! observed at tick boundaries only.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use warden_core::protocol::HeartbeatPayload;
use warden_core::{Action, WardenCore};

use crate::client::ScreeningClient;
use crate::modem::{CallerIdLine, ModemSession};

/// Tick pacing: bounds CPU without adding meaningful caller-ID latency.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Run until the shutdown token flips, then close the modem cleanly.
pub async fn run(
    core: &mut WardenCore,
    modem: &mut ModemSession,
    client: &ScreeningClient,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        for action in core.tick(Instant::now()) {
            match action {
                Action::SendHeartbeat => {
                    let payload = HeartbeatPayload {
                        timestamp: chrono::Utc::now(),
                        status: "running".to_string(),
                        modem_status: modem.state().as_str().to_string(),
                    };
                    let ok = client.heartbeat(&payload).await;
                    core.on_heartbeat_result(Instant::now(), ok);
                }
                Action::ReopenModem => match modem.open().await {
                    Ok(()) => {
                        tracing::info!("modem reopened");
                        core.on_modem_recovered();
                    }
                    Err(err) => tracing::warn!(error = %err, "modem reopen failed"),
                },
                // Screening actions only come out of the event methods below.
                Action::ScreenCall { .. } | Action::HangUp { .. } => {}
            }
        }

        match modem.poll() {
            Ok(Some(line)) => handle_line(core, modem, client, &line).await,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "modem read failed");
                core.on_modem_error(Instant::now());
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
    }

    modem.close();
    tracing::info!(stats = ?core.stats(), "monitor stopped");
}

async fn handle_line(
    core: &mut WardenCore,
    modem: &mut ModemSession,
    client: &ScreeningClient,
    line: &CallerIdLine,
) {
    tracing::debug!(text = %line.text, at = %line.received_at, "modem line");
    if line.text.eq_ignore_ascii_case("RING") {
        tracing::info!("incoming call: ring");
    }
    let Some(Action::ScreenCall { number }) = core.on_modem_line(&line.text) else {
        return;
    };
    tracing::info!(number = %number, "caller id received, screening");
    let decision = client.screen_call(&number).await;
    match core.on_screen_decision(&decision) {
        Some(Action::HangUp { number }) => {
            tracing::warn!(number = %number, "call blocked, hanging up");
            if let Err(err) = modem.hang_up() {
                tracing::warn!(error = %err, "hangup failed");
                core.on_modem_error(Instant::now());
            }
        }
        _ => tracing::info!(number = %decision.phone_number, "call allowed"),
    }
}
