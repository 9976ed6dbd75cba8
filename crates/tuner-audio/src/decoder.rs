//! Decode adapters sitting between the source and the sink.
//!
//! Completions are delivered through a channel the renderer polls, never by
//! calling back into the renderer. Each `decode()` yields exactly one
//! completion, in submission order.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::fmt;
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use tuner_core::{DecodedUnit, DecoderKind, Error, Result, Sample};

/// Failure reported by a [`FrameDecoder`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error("unsupported stream: {0}")]
    Unsupported(String),
}

/// A codec that turns one compressed frame into PCM.
///
/// Runs on the software adapter's worker thread.
pub trait FrameDecoder: Send {
    fn name(&self) -> &'static str;

    fn decode_frame(
        &mut self,
        input: &[u8],
        presentation_time_us: i64,
    ) -> std::result::Result<Bytes, FrameDecodeError>;

    /// Drop any state carried between frames.
    fn reset(&mut self) {}
}

/// Result of one `decode()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded(DecodedUnit),
    Failed {
        presentation_time_us: i64,
        error: FrameDecodeError,
    },
}

impl DecodeOutcome {
    /// Convert into the decoded unit, or the fatal error for a failed frame.
    pub fn into_result(self) -> Result<DecodedUnit> {
        match self {
            Self::Decoded(unit) => Ok(unit),
            Self::Failed {
                presentation_time_us,
                error,
            } => Err(Error::Decode {
                pts_us: presentation_time_us,
                message: error.to_string(),
            }),
        }
    }
}

struct Completion {
    generation: u64,
    outcome: DecodeOutcome,
}

/// Completion channel plus bookkeeping for outstanding decodes.
///
/// A flush bumps the generation so completions for discarded input are
/// dropped on receipt.
struct Mailbox {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    generation: u64,
    in_flight: usize,
}

impl Mailbox {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            generation: 0,
            in_flight: 0,
        }
    }

    fn poll(&mut self) -> Option<DecodeOutcome> {
        loop {
            match self.rx.try_recv() {
                Ok(completion) if completion.generation == self.generation => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    return Some(completion.outcome);
                }
                Ok(_) => trace!("Dropping completion from flushed generation"),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    warn!("Decode completion channel closed");
                    return None;
                }
            }
        }
    }

    fn flush(&mut self) {
        self.generation += 1;
        self.in_flight = 0;
    }
}

/// Forwards compressed frames unmodified.
pub struct PassthroughAdapter {
    mailbox: Mailbox,
    started: bool,
}

impl PassthroughAdapter {
    fn new() -> Self {
        Self {
            mailbox: Mailbox::new(),
            started: false,
        }
    }

    fn decode(&mut self, sample: Sample) {
        self.mailbox.in_flight += 1;
        let completion = Completion {
            generation: self.mailbox.generation,
            outcome: DecodeOutcome::Decoded(DecodedUnit::from(sample)),
        };
        // The receiver lives in the same struct, so the send cannot fail.
        let _ = self.mailbox.tx.send(completion);
    }
}

enum WorkerCommand {
    Decode {
        generation: u64,
        sample: Sample,
    },
    Reset,
    Shutdown,
}

/// Decodes frames on a dedicated worker thread.
pub struct SoftwareAdapter {
    mailbox: Mailbox,
    decoder: Option<Box<dyn FrameDecoder>>,
    decoder_name: &'static str,
    command_tx: Option<Sender<WorkerCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl SoftwareAdapter {
    fn new(decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            mailbox: Mailbox::new(),
            decoder_name: decoder.name(),
            decoder: Some(decoder),
            command_tx: None,
            worker: None,
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.command_tx.is_some() {
            return Ok(());
        }
        let decoder = self.decoder.take().ok_or_else(|| {
            Error::DecoderUnavailable(format!("{} was already released", self.decoder_name))
        })?;

        let (command_tx, command_rx) = unbounded();
        let completion_tx = self.mailbox.tx.clone();
        let worker = std::thread::Builder::new()
            .name("frame-decoder".to_string())
            .spawn(move || run_worker(decoder, &command_rx, &completion_tx))
            .map_err(|e| Error::DecoderUnavailable(format!("Failed to spawn decoder: {e}")))?;

        info!("Software decoder started: {}", self.decoder_name);
        self.command_tx = Some(command_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn decode(&mut self, sample: Sample) -> Result<()> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| Error::InvalidState("decoder not started".to_string()))?;
        tx.send(WorkerCommand::Decode {
            generation: self.mailbox.generation,
            sample,
        })
        .map_err(|_| Error::DecoderUnavailable(format!("{} worker exited", self.decoder_name)))?;
        self.mailbox.in_flight += 1;
        Ok(())
    }

    fn flush(&mut self) {
        self.mailbox.flush();
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(WorkerCommand::Reset);
        }
    }

    fn release(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("{} worker panicked", self.decoder_name);
            }
        }
        self.mailbox.flush();
    }
}

impl Drop for SoftwareAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_worker(
    mut decoder: Box<dyn FrameDecoder>,
    command_rx: &Receiver<WorkerCommand>,
    completion_tx: &Sender<Completion>,
) {
    debug!("Decoder worker running: {}", decoder.name());
    while let Ok(command) = command_rx.recv() {
        match command {
            WorkerCommand::Decode { generation, sample } => {
                let pts = sample.presentation_time_us;
                let outcome = match decoder.decode_frame(&sample.data, pts) {
                    Ok(pcm) => DecodeOutcome::Decoded(DecodedUnit::new(pcm, pts)),
                    Err(error) => {
                        warn!("Frame at {pts}us failed to decode: {error}");
                        DecodeOutcome::Failed {
                            presentation_time_us: pts,
                            error,
                        }
                    }
                };
                if completion_tx.send(Completion { generation, outcome }).is_err() {
                    break;
                }
            }
            WorkerCommand::Reset => decoder.reset(),
            WorkerCommand::Shutdown => break,
        }
    }
    debug!("Decoder worker stopped: {}", decoder.name());
}

/// The decode strategy chosen when the renderer is built.
pub enum DecoderAdapter {
    Passthrough(PassthroughAdapter),
    Software(SoftwareAdapter),
}

impl DecoderAdapter {
    pub fn passthrough() -> Self {
        Self::Passthrough(PassthroughAdapter::new())
    }

    pub fn software(decoder: Box<dyn FrameDecoder>) -> Self {
        Self::Software(SoftwareAdapter::new(decoder))
    }

    /// Build the adapter named by configuration.
    pub fn from_kind(kind: DecoderKind, decoder: Option<Box<dyn FrameDecoder>>) -> Result<Self> {
        match kind {
            DecoderKind::Passthrough => Ok(Self::passthrough()),
            DecoderKind::Software => decoder.map(Self::software).ok_or_else(|| {
                Error::DecoderUnavailable("software decoding needs a frame decoder".to_string())
            }),
        }
    }

    pub fn start_decoder(&mut self) -> Result<()> {
        match self {
            Self::Passthrough(adapter) => {
                adapter.started = true;
                Ok(())
            }
            Self::Software(adapter) => adapter.start(),
        }
    }

    /// Submit one compressed sample; its outcome arrives through [`Self::poll`].
    pub fn decode(&mut self, sample: Sample) -> Result<()> {
        match self {
            Self::Passthrough(adapter) => {
                if !adapter.started {
                    return Err(Error::InvalidState("decoder not started".to_string()));
                }
                adapter.decode(sample);
                Ok(())
            }
            Self::Software(adapter) => adapter.decode(sample),
        }
    }

    /// Take the next completion, if one has arrived.
    pub fn poll(&mut self) -> Option<DecodeOutcome> {
        self.mailbox_mut().poll()
    }

    /// Number of submitted samples whose completion has not been taken.
    pub fn in_flight(&self) -> usize {
        match self {
            Self::Passthrough(adapter) => adapter.mailbox.in_flight,
            Self::Software(adapter) => adapter.mailbox.in_flight,
        }
    }

    /// Discard outstanding work and decoder state.
    pub fn flush(&mut self) {
        match self {
            Self::Passthrough(adapter) => adapter.mailbox.flush(),
            Self::Software(adapter) => adapter.flush(),
        }
    }

    pub fn release(&mut self) {
        match self {
            Self::Passthrough(adapter) => {
                adapter.mailbox.flush();
                adapter.started = false;
            }
            Self::Software(adapter) => adapter.release(),
        }
    }

    pub const fn is_software(&self) -> bool {
        matches!(self, Self::Software(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Passthrough(_) => "passthrough",
            Self::Software(adapter) => adapter.decoder_name,
        }
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        match self {
            Self::Passthrough(adapter) => &mut adapter.mailbox,
            Self::Software(adapter) => &mut adapter.mailbox,
        }
    }
}

impl fmt::Debug for DecoderAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderAdapter")
            .field("name", &self.name())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
