use std::fmt;
use std::io::Write;
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::engine::{Engine, Pipeline, PipelineState, TerminalEvent};
use crate::pipeline::PipelineDescription;
use crate::runtime::task_manager::TaskContext;
use crate::status::StatusLine;

/// What to do when the source reaches end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EosPolicy {
    /// Treat end of stream like a lost connection and reconnect.
    #[default]
    Retry,
    /// Release the pipeline and stop supervising.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting,
    Running,
    Disconnected,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "idle"),
            SupervisorState::Connecting => write!(f, "connecting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorEvent {
    pub state: SupervisorState,
    pub attempt: u64,
}

pub type SupervisorEventTx = mpsc::UnboundedSender<SupervisorEvent>;
pub type SupervisorEventRx = mpsc::UnboundedReceiver<SupervisorEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The task was asked to stop.
    Stopped,
    /// The source ended and [`EosPolicy::Stop`] is in effect.
    EndOfStream,
}

/// Keeps a receiver pipeline playing.
///
/// The supervisor instantiates the pipeline, plays it until the engine
/// reports an error or end of stream, releases it and starts over after a
/// fixed delay. A pipeline that cannot be instantiated is retried the same
/// way. There is no limit on the number of attempts. While waiting, an
/// animated status line shows that the process is still alive.
///
/// The only way out (apart from [`EosPolicy::Stop`]) is the stop signal of
/// the [`TaskContext`] passed to [`RetrySupervisor::run`].
pub struct RetrySupervisor<E, W> {
    engine: E,
    description: PipelineDescription,
    label: String,
    eos_policy: EosPolicy,
    retry_delay: Duration,
    status: StatusLine<W>,
    event_tx: Option<SupervisorEventTx>,
    attempt: u64,
}

impl<E, W> RetrySupervisor<E, W>
where
    E: Engine + Send,
    W: Write + Send,
{
    /// Time between the end of one attempt and the start of the next.
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);

    pub fn new(engine: E, description: PipelineDescription, status_out: W) -> Self {
        Self {
            engine,
            label: description.to_string(),
            description,
            eos_policy: EosPolicy::default(),
            retry_delay: Self::RETRY_DELAY,
            status: StatusLine::new(status_out),
            event_tx: None,
            attempt: 0,
        }
    }

    /// Name of the stream as shown to the operator.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_eos_policy(mut self, eos_policy: EosPolicy) -> Self {
        self.eos_policy = eos_policy;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Publish every state transition on the given channel.
    pub fn with_events(mut self, event_tx: SupervisorEventTx) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub async fn run(mut self, mut task_context: TaskContext) -> SupervisorExit {
        self.transition(SupervisorState::Idle);

        loop {
            self.transition(SupervisorState::Connecting);
            let mut pipeline = match self.engine.instantiate(&self.description) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    tracing::error!(
                        %err, attempt = self.attempt,
                        "failed to create pipeline (waiting before retrying)",
                    );
                    self.show_retrying("Failed to create pipeline.");
                    if self.wait_before_retry(&mut task_context).await {
                        return SupervisorExit::Stopped;
                    }
                    continue;
                }
            };

            let event = match pipeline.set_state(PipelineState::Playing) {
                Ok(()) => {
                    tracing::info!(stream = %self.label, attempt = self.attempt, "playing stream");
                    let line = format!("Playing stream: {}", self.label);
                    self.show_line(&line);
                    self.transition(SupervisorState::Running);
                    select! {
                        // CANCEL SAFETY: `Pipeline::wait_for_terminal_event` is cancel safe.
                        event = pipeline.wait_for_terminal_event() => event,
                        // CANCEL SAFETY: `TaskContext::wait_for_stop` is cancel safe.
                        _ = task_context.wait_for_stop() => {
                            tracing::trace!("stopping supervisor (during playback)");
                            pipeline.release();
                            return SupervisorExit::Stopped;
                        },
                    }
                }
                Err(err) => TerminalEvent::Error(err.to_string()),
            };

            pipeline.release();
            self.transition(SupervisorState::Disconnected);

            match event {
                TerminalEvent::Eos if self.eos_policy == EosPolicy::Stop => {
                    tracing::info!(stream = %self.label, "end of stream (stopping)");
                    self.show_line("End of stream.");
                    return SupervisorExit::EndOfStream;
                }
                event => {
                    tracing::warn!(
                        %event, attempt = self.attempt,
                        "connection lost (waiting before retrying)",
                    );
                    self.show_retrying("Disconnected from server.");
                    if self.wait_before_retry(&mut task_context).await {
                        return SupervisorExit::Stopped;
                    }
                }
            }
        }
    }

    /// Wait out the retry delay and advance the attempt counter. Returns
    /// `true` if the task was asked to stop in the meantime.
    async fn wait_before_retry(&mut self, task_context: &mut TaskContext) -> bool {
        match timeout(self.retry_delay, task_context.wait_for_stop()).await {
            Ok(()) => {
                tracing::trace!("stopping supervisor (during retry delay)");
                true
            }
            Err(_) => {
                self.attempt += 1;
                false
            }
        }
    }

    fn transition(&mut self, state: SupervisorState) {
        tracing::debug!(%state, attempt = self.attempt, "supervisor state");
        if let Some(event_tx) = self.event_tx.as_ref() {
            let _ = event_tx.send(SupervisorEvent {
                state,
                attempt: self.attempt,
            });
        }
    }

    fn show_retrying(&mut self, message: &str) {
        if let Err(err) = self.status.retrying(message, self.attempt) {
            tracing::trace!(%err, "failed to write status line");
        }
    }

    fn show_line(&mut self, line: &str) {
        if let Err(err) = self.status.line(line) {
            tracing::trace!(%err, "failed to write status line");
        }
    }
}

#[cfg(test)]
mod tests {

    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::{self, BoxFuture, FutureExt};
    use tokio::sync::mpsc;

    use super::{
        EosPolicy, RetrySupervisor, SupervisorEvent, SupervisorEventRx, SupervisorExit,
        SupervisorState,
    };
    use crate::engine::{Engine, EngineError, Pipeline, PipelineState, TerminalEvent};
    use crate::pipeline::PipelineDescription;
    use crate::runtime::Runtime;

    #[derive(Clone)]
    enum Step {
        FailInstantiate,
        FailPlay,
        /// Play until the given event, or forever.
        Play(Option<TerminalEvent>),
    }

    struct FakeEngine {
        script: VecDeque<Step>,
        fallback: Step,
        instantiated: Arc<Mutex<Vec<String>>>,
        released: Arc<AtomicUsize>,
    }

    impl FakeEngine {
        fn new(script: Vec<Step>, fallback: Step) -> Self {
            Self {
                script: script.into(),
                fallback,
                instantiated: Arc::new(Mutex::new(Vec::new())),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Engine for FakeEngine {
        type Pipeline = FakePipeline;

        fn instantiate(
            &mut self,
            description: &PipelineDescription,
        ) -> Result<FakePipeline, EngineError> {
            self.instantiated
                .lock()
                .unwrap()
                .push(description.to_string());
            let step = self
                .script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            match step {
                Step::FailInstantiate => {
                    Err(EngineError::Instantiate("no element \"rtspsrc\"".to_string()))
                }
                Step::FailPlay => Ok(FakePipeline {
                    fail_play: true,
                    event: None,
                    released: self.released.clone(),
                }),
                Step::Play(event) => Ok(FakePipeline {
                    fail_play: false,
                    event,
                    released: self.released.clone(),
                }),
            }
        }
    }

    struct FakePipeline {
        fail_play: bool,
        event: Option<TerminalEvent>,
        released: Arc<AtomicUsize>,
    }

    impl Pipeline for FakePipeline {
        fn set_state(&mut self, state: PipelineState) -> Result<(), EngineError> {
            if self.fail_play && state == PipelineState::Playing {
                Err(EngineError::StateChange("device busy".to_string()))
            } else {
                Ok(())
            }
        }

        fn wait_for_terminal_event(&mut self) -> BoxFuture<'_, TerminalEvent> {
            match self.event.clone() {
                Some(event) => future::ready(event).boxed(),
                None => future::pending().boxed(),
            }
        }

        fn release(self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn supervisor(
        engine: FakeEngine,
        status: SharedBuffer,
    ) -> (RetrySupervisor<FakeEngine, SharedBuffer>, SupervisorEventRx) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let supervisor = RetrySupervisor::new(
            engine,
            PipelineDescription::new("rtspsrc location=rtsp://camera/live ! fakesink"),
            status,
        )
        .with_label("rtsp://camera/live")
        .with_events(event_tx);
        (supervisor, event_rx)
    }

    async fn collect_until(
        event_rx: &mut SupervisorEventRx,
        last: SupervisorEvent,
    ) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
            if event == last {
                break;
            }
        }
        events
    }

    fn event(state: SupervisorState, attempt: u64) -> SupervisorEvent {
        SupervisorEvent { state, attempt }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_forever() {
        let engine = FakeEngine::new(
            vec![
                Step::FailInstantiate,
                Step::FailInstantiate,
                Step::Play(Some(TerminalEvent::Eos)),
            ],
            Step::Play(None),
        );
        let instantiated = engine.instantiated.clone();
        let released = engine.released.clone();
        let status = SharedBuffer::default();
        let (supervisor, mut event_rx) = supervisor(engine, status.clone());

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        let events = collect_until(&mut event_rx, event(SupervisorState::Running, 3)).await;
        assert_eq!(
            events,
            vec![
                event(SupervisorState::Idle, 0),
                event(SupervisorState::Connecting, 0),
                event(SupervisorState::Connecting, 1),
                event(SupervisorState::Connecting, 2),
                event(SupervisorState::Running, 2),
                event(SupervisorState::Disconnected, 2),
                event(SupervisorState::Connecting, 3),
                event(SupervisorState::Running, 3),
            ],
        );

        let connecting_attempts = events
            .iter()
            .filter(|event| event.state == SupervisorState::Connecting)
            .map(|event| event.attempt)
            .collect::<Vec<_>>();
        assert!(connecting_attempts.windows(2).all(|pair| pair[0] < pair[1]));

        // Still playing an hour later.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!task.is_finished());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
        assert_eq!(released.load(Ordering::SeqCst), 2);

        let instantiated = instantiated.lock().unwrap();
        assert_eq!(instantiated.len(), 4);
        assert!(instantiated.iter().all(|description| description == &instantiated[0]));

        let output = status.contents();
        assert!(output.contains("\rFailed to create pipeline. Retrying.  "));
        assert!(output.contains("\rFailed to create pipeline. Retrying.. "));
        assert!(output.contains("\rDisconnected from server. Retrying..."));
        assert_eq!(output.matches("Playing stream: rtsp://camera/live\n").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_delay_is_constant() {
        let engine = FakeEngine::new(vec![], Step::FailInstantiate);
        let (supervisor, mut event_rx) = supervisor(engine, SharedBuffer::default());
        let supervisor = supervisor.with_retry_delay(Duration::from_millis(250));

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        let mut previous = start;
        let mut gaps = Vec::new();
        while let Some(event) = event_rx.recv().await {
            if event.state == SupervisorState::Connecting && event.attempt > 0 {
                let now = tokio::time::Instant::now();
                gaps.push(now - previous);
                previous = now;
                if event.attempt == 5 {
                    break;
                }
            }
        }
        assert_eq!(gaps.len(), 5);
        assert!(gaps.iter().all(|gap| *gap == Duration::from_millis(250)));

        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn eos_stops_with_stop_policy() {
        let engine = FakeEngine::new(vec![Step::Play(Some(TerminalEvent::Eos))], Step::Play(None));
        let released = engine.released.clone();
        let status = SharedBuffer::default();
        let (supervisor, _event_rx) = supervisor(engine, status.clone());
        let supervisor = supervisor.with_eos_policy(EosPolicy::Stop);

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        assert_eq!(task.join().await, Some(SupervisorExit::EndOfStream));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(status.contents().ends_with("End of stream.\n"));
        runtime.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn error_retries_with_stop_policy() {
        let engine = FakeEngine::new(
            vec![Step::Play(Some(TerminalEvent::Error(
                "Could not open resource for reading.".to_string(),
            )))],
            Step::Play(None),
        );
        let (supervisor, mut event_rx) = supervisor(engine, SharedBuffer::default());
        let supervisor = supervisor.with_eos_policy(EosPolicy::Stop);

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        collect_until(&mut event_rx, event(SupervisorState::Running, 1)).await;
        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn play_failure_is_a_disconnect() {
        let engine = FakeEngine::new(vec![Step::FailPlay], Step::Play(None));
        let released = engine.released.clone();
        let (supervisor, mut event_rx) = supervisor(engine, SharedBuffer::default());

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        let events = collect_until(&mut event_rx, event(SupervisorState::Running, 1)).await;
        assert_eq!(
            events,
            vec![
                event(SupervisorState::Idle, 0),
                event(SupervisorState::Connecting, 0),
                event(SupervisorState::Disconnected, 0),
                event(SupervisorState::Connecting, 1),
                event(SupervisorState::Running, 1),
            ],
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);

        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_retry_delay() {
        let engine = FakeEngine::new(vec![], Step::FailInstantiate);
        let released = engine.released.clone();
        let (supervisor, mut event_rx) = supervisor(engine, SharedBuffer::default());
        let supervisor = supervisor.with_retry_delay(Duration::from_secs(3600));

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        collect_until(&mut event_rx, event(SupervisorState::Connecting, 0)).await;
        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_playback_releases_pipeline() {
        let engine = FakeEngine::new(vec![], Step::Play(None));
        let released = engine.released.clone();
        let (supervisor, mut event_rx) = supervisor(engine, SharedBuffer::default());

        let runtime = Runtime::new();
        let mut task = runtime
            .task()
            .spawn(move |task_context| supervisor.run(task_context))
            .await
            .unwrap();

        collect_until(&mut event_rx, event(SupervisorState::Running, 0)).await;
        runtime.stop().await;
        assert_eq!(task.join().await, Some(SupervisorExit::Stopped));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
