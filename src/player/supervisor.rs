use std::collections::BTreeSet;

use crate::config::DecoderSettings;
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::PlayerEvent;

/// Tracks decoders that are not ready and retries them one at a time.
#[derive(Clone, Debug)]
pub struct ReadinessSupervisor {
    max_attempts: u32,
    backoff_ms: i64,
    attempts: u32,
    not_ready: BTreeSet<usize>,
    /// Track and time of the retry in flight.
    pending: Option<(usize, i64)>,
}

/// What the caller should do about a player event.
#[derive(Debug)]
pub enum Verdict {
    Fine,
    /// The track will be retried after the backoff.
    Retrying(usize),
    /// The track could not be recovered; the other tracks keep going.
    TrackFailed(MontageError),
    /// A track failed while exporting.
    AbortExport(MontageError),
}

impl ReadinessSupervisor {
    pub fn new(settings: &DecoderSettings) -> Self {
        Self {
            max_attempts: settings.retry_attempts,
            backoff_ms: i64::try_from(settings.retry_backoff_ms).unwrap_or(i64::MAX),
            attempts: 0,
            not_ready: BTreeSet::new(),
            pending: None,
        }
    }

    pub fn not_ready(&self) -> &BTreeSet<usize> {
        &self.not_ready
    }

    pub fn all_ready(&self) -> bool {
        self.not_ready.is_empty()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a fresh retry budget, as before an export.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.pending = None;
    }

    pub fn observe(
        &mut self,
        track: usize,
        event: &PlayerEvent,
        exporting: bool,
        now_ms: i64,
    ) -> Verdict {
        if !event.is_failure() {
            if *event == PlayerEvent::Ready {
                self.not_ready.remove(&track);
            }
            return Verdict::Fine;
        }
        self.not_ready.insert(track);
        tracing::warn!(track, ?event, exporting, "decoder not ready");
        let error = MontageError::Decoder {
            track,
            attempts: self.attempts,
        };
        if exporting {
            return Verdict::AbortExport(error);
        }
        // A retry already in flight picks this track up when it completes.
        if self.schedule(track, now_ms) || self.pending.is_some() {
            Verdict::Retrying(track)
        } else {
            Verdict::TrackFailed(error)
        }
    }

    fn schedule(&mut self, track: usize, now_ms: i64) -> bool {
        if self.pending.is_some() || self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        self.pending = Some((track, now_ms + self.backoff_ms));
        true
    }

    /// Run a retry whose backoff has elapsed, then queue the next not-ready track.
    pub fn poll(
        &mut self,
        now_ms: i64,
        mut retry: impl FnMut(usize) -> MontageResult<()>,
    ) -> MontageResult<Option<usize>> {
        let Some((track, due)) = self.pending else {
            return Ok(None);
        };
        if now_ms < due {
            return Ok(None);
        }
        self.pending = None;
        self.not_ready.remove(&track);
        tracing::debug!(track, attempt = self.attempts, "retrying decoder");
        retry(track)?;
        if let Some(&next) = self.not_ready.iter().next() {
            self.schedule(next, now_ms);
        }
        Ok(Some(track))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/player/supervisor.rs"]
mod tests;
