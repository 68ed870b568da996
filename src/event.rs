use crossterm::event::{
    Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind,
};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded event queue capacity.
const EVENT_CHANNEL_CAPACITY: usize = 2048;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Paste(String),
    Tick,
    Resize,
}

/// Map a terminal event to a console event. Key releases/repeats and bare
/// mouse motion are dropped here so the UI loop only sees actionable input.
fn translate(event: CrosstermEvent) -> Option<Event> {
    match event {
        CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
        CrosstermEvent::Mouse(mouse) if mouse.kind != MouseEventKind::Moved => {
            Some(Event::Mouse(mouse))
        }
        CrosstermEvent::Paste(text) => Some(Event::Paste(text)),
        CrosstermEvent::Resize(_, _) => Some(Event::Resize),
        _ => None,
    }
}

pub struct EventHandler {
    rx: mpsc::Receiver<Event>,
    _task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self::from_stream(EventStream::new(), tick_rate)
    }

    /// Build an EventHandler from any crossterm-compatible event stream.
    pub fn from_stream<S>(stream: S, tick_rate: Duration) -> Self
    where
        S: Stream<Item = Result<CrosstermEvent, std::io::Error>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut reader = stream;
            let mut tick = tokio::time::interval(tick_rate);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        // Ticks are coalesced when the queue is full.
                        match tx.try_send(Event::Tick) {
                            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    event = reader.next() => {
                        let event = match event {
                            Some(Ok(event)) => event,
                            Some(Err(err)) => {
                                tracing::warn!(error = %err, "terminal event stream failed");
                                break;
                            }
                            None => break,
                        };
                        if let Some(event) = translate(event) {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self { rx, _task: task }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
