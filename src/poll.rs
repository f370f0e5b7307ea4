use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::engine::AdvisoryEngine;
use crate::error::{AdvisorError, Result};
use crate::render::{render, Display};
use crate::state::{reduce, DisplayState, Event};
use crate::telemetry::TelemetrySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Toggle,
    Quit,
}

/// Sequential poll -> decide -> reduce -> render, one snapshot at a time.
pub struct PollLoop<S, D> {
    engine: AdvisoryEngine,
    source: Arc<S>,
    display: D,
    interval: Duration,
}

impl<S, D> PollLoop<S, D>
where
    S: TelemetrySource + 'static,
    D: Display,
{
    pub fn new(engine: AdvisoryEngine, source: S, display: D, interval: Duration) -> Self {
        Self {
            engine,
            source: Arc::new(source),
            display,
            interval,
        }
    }

    /// Runs until `Control::Quit` or the control channel closes, returning
    /// the last state. Fetch failures are shown and the loop carries on; a
    /// classifier failure ends the loop with that error.
    pub async fn run(mut self, mut ctrl: mpsc::Receiver<Control>) -> Result<DisplayState> {
        let mut state = DisplayState::default();
        self.display.show(&render(&state));

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next = tokio::select! {
                _ = ticker.tick() => {
                    if state.running {
                        let event = self.poll_once().await?;
                        reduce(&state, event)
                    } else {
                        state.clone()
                    }
                }
                cmd = ctrl.recv() => match cmd {
                    Some(Control::Toggle) => {
                        tracing::info!(running = !state.running, "toggled polling");
                        reduce(&state, Event::Toggle)
                    }
                    Some(Control::Quit) | None => break,
                },
            };

            if next != state {
                state = next;
                self.display.show(&render(&state));
            }
        }

        tracing::info!("poll loop stopped");
        Ok(state)
    }

    async fn poll_once(&self) -> Result<Event> {
        let src = Arc::clone(&self.source);
        let fetched = match tokio::task::spawn_blocking(move || src.fetch()).await {
            Ok(r) => r,
            Err(e) => Err(AdvisorError::Fetch(format!("fetch task failed: {}", e))),
        };

        match fetched {
            Ok(snapshot) => {
                let decision = self.engine.evaluate(&snapshot)?;
                tracing::debug!(mode = %decision.mode, source = ?decision.source, "decided");
                Ok(Event::Decided {
                    snapshot,
                    mode: decision.mode,
                })
            }
            Err(e) => {
                tracing::warn!("telemetry poll failed: {}", e);
                Ok(Event::FetchFailed { reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassifierModel;
    use crate::render::Frame;
    use crate::types::{AdvisoryMode, TelemetrySnapshot};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(10);

    struct Fixed(Vec<f32>);

    impl ClassifierModel for Fixed {
        fn infer(&self, _x: &[f32]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    /// Replays a script, repeating the last entry once exhausted.
    struct Scripted {
        script: Mutex<VecDeque<Option<TelemetrySnapshot>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(script: Vec<Option<TelemetrySnapshot>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: Mutex::new(script.into()),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl TelemetrySource for Scripted {
        fn fetch(&self) -> Result<TelemetrySnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut q = self.script.lock();
            let item = if q.len() > 1 { q.pop_front().flatten() } else { q.front().copied().flatten() };
            item.ok_or_else(|| AdvisorError::Fetch("connection refused".into()))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Frame>>>);

    impl Display for Recorder {
        fn show(&mut self, frame: &Frame) {
            self.0.lock().push(frame.clone());
        }
    }

    fn snap(speed: f32, battery: f32) -> TelemetrySnapshot {
        TelemetrySnapshot::new(speed, 20.0, 22.0, battery)
    }

    #[tokio::test]
    async fn failure_after_success_keeps_last_mode() {
        let (src, calls) = Scripted::new(vec![Some(snap(140.0, 50.0)), None]);
        let rec = Recorder::default();
        let engine = AdvisoryEngine::new(Box::new(Fixed(vec![1.0, 0.0, 0.0, 0.0])));
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(PollLoop::new(engine, src, rec.clone(), TICK).run(rx));

        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(Control::Quit).await.unwrap();
        let state = handle.await.unwrap().unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(state.mode, AdvisoryMode::Safety);
        assert_eq!(state.advice, AdvisoryMode::Safety.advice());
        assert_eq!(state.snapshot.speed_kmh, 140.0);
        assert!(state.error.is_some());

        let frames = rec.0.lock();
        assert_eq!(frames[0].lines[0], "Mode: Normal");
        assert!(frames.iter().any(|f| f.lines[0] == "Mode: Safety"));
    }

    #[tokio::test]
    async fn model_output_drives_mode() {
        let (src, _) = Scripted::new(vec![Some(snap(60.0, 50.0))]);
        let engine = AdvisoryEngine::new(Box::new(Fixed(vec![0.1, 0.2, 0.3, 0.4])));
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(PollLoop::new(engine, src, Recorder::default(), TICK).run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);
        let state = handle.await.unwrap().unwrap();
        assert_eq!(state.mode, AdvisoryMode::Energy);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn stopped_loop_does_not_fetch() {
        let (src, calls) = Scripted::new(vec![Some(snap(60.0, 50.0))]);
        let engine = AdvisoryEngine::new(Box::new(Fixed(vec![1.0, 0.0, 0.0, 0.0])));
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(PollLoop::new(engine, src, Recorder::default(), TICK).run(rx));

        tx.send(Control::Toggle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);

        tx.send(Control::Toggle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(calls.load(Ordering::SeqCst) > before);

        tx.send(Control::Quit).await.unwrap();
        let state = handle.await.unwrap().unwrap();
        assert!(state.running);
    }

    #[tokio::test]
    async fn bad_model_output_stops_the_loop() {
        let (src, _) = Scripted::new(vec![Some(snap(60.0, 50.0))]);
        let engine = AdvisoryEngine::new(Box::new(Fixed(vec![0.5, 0.5])));
        let (_tx, rx) = mpsc::channel(4);
        let res = PollLoop::new(engine, src, Recorder::default(), TICK).run(rx).await;
        assert!(matches!(res, Err(AdvisorError::ModelOutput(_))));
    }
}
