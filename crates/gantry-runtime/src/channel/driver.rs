//! The channel driver: one task owning the reconnect state machine.
//!
//! All waits (connect timeout, reconnect delay, synthetic tick) live inside
//! this task, so cancelling its token leaves no timer behind. Timeouts,
//! refusals, and transport errors are treated identically: each consumes
//! one retry budget unit.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use gantry_core::{
    BackendConfig, ConnectionState, EventSink, LogEvent, LogLevel, Reachability, SessionContext,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::listeners::ListenerSet;
use super::synthetic::SyntheticFeed;
use super::{ChannelError, ChannelEvent, Command, StreamPayload};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ReachabilityRx = watch::Receiver<Reachability>;

pub(super) struct DriverCtx {
    pub config: Arc<BackendConfig>,
    pub session: Arc<SessionContext>,
    pub listeners: Arc<ListenerSet>,
    pub sink: Arc<dyn EventSink>,
    pub cancel: CancellationToken,
}

struct PendingSend {
    payload: String,
    ack: oneshot::Sender<Result<(), ChannelError>>,
}

enum Step {
    Connect,
    Open(Box<WsStream>),
    Delay,
    Synthetic,
    Shutdown,
}

pub(super) async fn run(ctx: DriverCtx, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut pending: VecDeque<PendingSend> = VecDeque::new();
    let mut reachability = ctx.session.watch_reachability();
    // The value present at startup has been observed; only changes matter
    reachability.borrow_and_update();

    let mut step = Step::Connect;
    loop {
        step = match step {
            Step::Connect => attempt_connect(&ctx).await,
            Step::Open(ws) => {
                serve_open(&ctx, *ws, &mut commands, &mut pending, &mut reachability).await
            }
            Step::Delay => {
                wait_reconnect_delay(&ctx, &mut commands, &mut pending, &mut reachability).await
            }
            Step::Synthetic => {
                run_synthetic(&ctx, &mut commands, &mut pending, &mut reachability).await
            }
            Step::Shutdown => break,
        };
    }

    fail_pending(&mut pending);
    ctx.session.transition_to(ConnectionState::Disconnected);
    debug!("realtime channel driver stopped");
}

/// One connection attempt, bounded by the configured connect timeout. A
/// timeout is a failure like any other and triggers immediate fallback
/// evaluation rather than waiting on the transport.
async fn attempt_connect(ctx: &DriverCtx) -> Step {
    ctx.session.transition_to(ConnectionState::Connecting);
    let url = ctx.config.stream_url();
    debug!(%url, "connecting realtime stream");

    tokio::select! {
        result = timeout(ctx.config.connect_timeout(), connect_async(url.as_str())) => match result {
            Ok(Ok((ws, _response))) => {
                ctx.session.reset_attempts();
                ctx.session.transition_to(ConnectionState::Connected);
                ctx.listeners.dispatch(&ChannelEvent::Open);
                debug!("realtime stream open");
                Step::Open(Box::new(ws))
            }
            Ok(Err(e)) => {
                debug!(error = %e, "realtime connect failed");
                ctx.listeners.dispatch(&ChannelEvent::Error {
                    message: e.to_string(),
                });
                next_after_failure(ctx)
            }
            Err(_elapsed) => {
                debug!("realtime connect timed out");
                ctx.listeners.dispatch(&ChannelEvent::Error {
                    message: "connection attempt timed out".to_string(),
                });
                next_after_failure(ctx)
            }
        },
        () = ctx.cancel.cancelled() => Step::Shutdown,
    }
}

/// Every failure consumes one budget unit. The budget saturates, so after
/// exactly `max_attempts` consecutive failures the machine is in synthetic
/// mode and can never sit in `Connecting` forever.
fn next_after_failure(ctx: &DriverCtx) -> Step {
    let budget = ctx.session.consume_attempt();
    if budget.exhausted() {
        Step::Synthetic
    } else {
        ctx.session.transition_to(ConnectionState::Disconnected);
        debug!(
            attempts = budget.attempts,
            max = budget.max_attempts,
            "scheduling reconnect"
        );
        Step::Delay
    }
}

async fn serve_open(
    ctx: &DriverCtx,
    mut ws: WsStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<PendingSend>,
    reachability: &mut ReachabilityRx,
) -> Step {
    // Deliver what was queued while the stream was down, oldest first
    while let Some(queued) = pending.pop_front() {
        if let Err(e) = ws.send(Message::Text(queued.payload)).await {
            let _ = queued.ack.send(Err(ChannelError::Transport(e.to_string())));
            return lost(ctx, Some(e.to_string()));
        }
        let _ = queued.ack.send(Ok(()));
    }

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver_payload(ctx, text),
                Some(Ok(Message::Binary(bytes))) => {
                    deliver_payload(ctx, String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    return lost(ctx, reason);
                }
                Some(Err(e)) => {
                    ctx.listeners.dispatch(&ChannelEvent::Error {
                        message: e.to_string(),
                    });
                    return lost(ctx, Some(e.to_string()));
                }
                None => return lost(ctx, None),
            },
            command = commands.recv() => match command {
                Some(Command::Connect) => {} // already open; coalesced no-op
                Some(Command::Send { payload, ack }) => {
                    match ws.send(Message::Text(payload)).await {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = ack.send(Err(ChannelError::Transport(e.to_string())));
                            return lost(ctx, Some(e.to_string()));
                        }
                    }
                }
                None => {} // channel handle dropped; run until cancelled
            },
            changed = reachability.changed() => {
                if changed.is_err() {
                    return Step::Shutdown;
                }
                if matches!(*reachability.borrow_and_update(), Reachability::Unreachable { .. }) {
                    // The health monitor lost the backend; recycle the
                    // stream and begin the reconnect sequence
                    debug!("status checks failing, recycling realtime stream");
                    let _ = ws.close(None).await;
                    return lost(ctx, Some("status endpoint unreachable".to_string()));
                }
            },
            () = ctx.cancel.cancelled() => {
                let _ = ws.close(None).await;
                return Step::Shutdown;
            }
        }
    }
}

fn lost(ctx: &DriverCtx, reason: Option<String>) -> Step {
    ctx.listeners.dispatch(&ChannelEvent::Closed { reason });
    next_after_failure(ctx)
}

/// A parse failure must not close the connection: whatever arrived is
/// forwarded raw so delivery stays at-least-once.
fn deliver_payload(ctx: &DriverCtx, text: String) {
    match serde_json::from_str::<LogEvent>(&text) {
        Ok(event) => {
            ctx.sink.emit(event.clone());
            ctx.listeners
                .dispatch(&ChannelEvent::Message(StreamPayload::Event(event)));
        }
        Err(e) => {
            debug!(error = %e, "unparseable stream payload, forwarding raw");
            ctx.listeners
                .dispatch(&ChannelEvent::Message(StreamPayload::Raw(text)));
        }
    }
}

/// The fixed delay between reconnect attempts. The wait stays responsive:
/// queued sends accumulate, the exhausted signal degrades immediately, and
/// cancellation aborts.
async fn wait_reconnect_delay(
    ctx: &DriverCtx,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<PendingSend>,
    reachability: &mut ReachabilityRx,
) -> Step {
    let delay = sleep(ctx.config.reconnect_delay());
    tokio::pin!(delay);

    loop {
        tokio::select! {
            () = &mut delay => return Step::Connect,
            command = commands.recv() => match command {
                Some(Command::Connect) => {} // a retry is already scheduled
                Some(Command::Send { payload, ack }) => {
                    pending.push_back(PendingSend { payload, ack });
                }
                None => {}
            },
            changed = reachability.changed() => {
                if changed.is_err() {
                    return Step::Shutdown;
                }
                if matches!(
                    *reachability.borrow_and_update(),
                    Reachability::Unreachable { exhausted: true }
                ) {
                    // Global signal: stop burning budget and degrade now
                    return Step::Synthetic;
                }
            },
            () = ctx.cancel.cancelled() => return Step::Shutdown,
        }
    }
}

/// Degraded steady state. Announced exactly once per entry, then the feed
/// ticks until the reachability signal reports the backend is back or the
/// channel is shut down.
async fn run_synthetic(
    ctx: &DriverCtx,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<PendingSend>,
    reachability: &mut ReachabilityRx,
) -> Step {
    // Sends queued for the abandoned attempt sequence fail rather than
    // silently dropping
    fail_pending(pending);

    let announcement = LogEvent::system(
        LogLevel::Warning,
        "realtime stream unavailable; switching to synthetic events",
    )
    .with_synthetic(true);
    ctx.sink.emit(announcement.clone());
    ctx.listeners
        .dispatch(&ChannelEvent::Message(StreamPayload::Event(announcement)));
    ctx.session.transition_to(ConnectionState::SyntheticMode);
    warn!("entered synthetic mode");

    let mut feed = SyntheticFeed::new();
    let tick = ctx.config.synthetic_tick();
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let event = feed.next_event();
                ctx.sink.emit(event.clone());
                ctx.listeners
                    .dispatch(&ChannelEvent::Message(StreamPayload::Event(event)));
            },
            changed = reachability.changed() => {
                if changed.is_err() {
                    return Step::Shutdown;
                }
                if matches!(*reachability.borrow_and_update(), Reachability::Reachable) {
                    // The status endpoint came back; try a real connection
                    debug!("backend reachable again, leaving synthetic mode");
                    return Step::Connect;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Connect) => {
                    debug!("connect request ignored while in synthetic mode");
                }
                Some(Command::Send { ack, .. }) => {
                    let _ = ack.send(Err(ChannelError::Abandoned));
                }
                None => {}
            },
            () = ctx.cancel.cancelled() => return Step::Shutdown,
        }
    }
}

fn fail_pending(pending: &mut VecDeque<PendingSend>) {
    for queued in pending.drain(..) {
        let _ = queued.ack.send(Err(ChannelError::Abandoned));
    }
}
