use crate::submission::{AudioOutcome, SubmissionOutcome, UrlOutcome};

/// Which input surface is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Url,
    Audio,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Url => "url",
            Mode::Audio => "audio",
        }
    }
}

/// What the result area should show right now.
#[derive(Debug, PartialEq)]
pub enum ResultView<'a> {
    Matches(&'a AudioOutcome),
    NoMatch(&'a AudioOutcome),
    UrlResult(&'a UrlOutcome),
    Failure(&'a str),
    Nothing,
}

/// Active mode plus the outcome of the most recent submission.
///
/// Switching modes always clears the last outcome, and any submission still
/// in flight at that moment is disowned: its token goes stale and its
/// outcome is dropped on arrival instead of appearing under the new mode.
#[derive(Debug)]
pub struct ViewState {
    active_mode: Mode,
    last_outcome: Option<SubmissionOutcome>,
    epoch: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            active_mode: Mode::Url,
            last_outcome: None,
            epoch: 0,
        }
    }

    pub fn active_mode(&self) -> Mode {
        self.active_mode
    }

    pub fn last_outcome(&self) -> Option<&SubmissionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Switch the active mode. Returns false for a same-mode no-op; an
    /// actual change clears the last outcome and invalidates in-flight
    /// tokens.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.active_mode == mode {
            return false;
        }

        self.active_mode = mode;
        self.last_outcome = None;
        self.epoch += 1;
        true
    }

    /// Start a submission: clears the previous result and hands out the
    /// token the outcome must present on arrival.
    pub fn begin_submission(&mut self) -> u64 {
        self.last_outcome = None;
        self.epoch
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.epoch
    }

    /// Accept an arriving outcome if its token is still current. A stale
    /// token means the mode changed underneath the submission; the outcome
    /// is dropped and false returned.
    pub fn apply_outcome(&mut self, token: u64, outcome: SubmissionOutcome) -> bool {
        if !self.is_current(token) {
            return false;
        }

        self.last_outcome = Some(outcome);
        true
    }

    /// The single combined rendering decision.
    pub fn view(&self) -> ResultView<'_> {
        match &self.last_outcome {
            Some(SubmissionOutcome::Audio(audio)) if audio.match_found => {
                ResultView::Matches(audio)
            }
            Some(SubmissionOutcome::Audio(audio)) => ResultView::NoMatch(audio),
            Some(SubmissionOutcome::Url(url)) => ResultView::UrlResult(url),
            Some(SubmissionOutcome::TransportFailure { message }) => {
                ResultView::Failure(message.as_str())
            }
            None => ResultView::Nothing,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}
