use crate::submission::{AudioOutcome, Candidate};
use regex::Regex;

/// A candidate annotated with its confidence relative to the best match.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub confidence_percent: f64,
}

/// Derives the confidence-ordered result set and embeddable media
/// references. Pure derivation; never mutates what it reads.
pub struct Ranker {
    video_id: Regex,
}

impl Ranker {
    pub fn new() -> Self {
        Self {
            // watch?v=<id> and the youtu.be/<id> short form; the id ends at
            // the first `&`, `?` or whitespace
            video_id: Regex::new(r"(?:watch\?v=|youtu\.be/)([^&?\s]+)").unwrap(),
        }
    }

    /// Confidence per candidate, slot order preserved. The best score maps
    /// to 100.0, rounded to one decimal; an all-zero score set stays at 0.0.
    pub fn rank(&self, outcome: &AudioOutcome) -> Vec<RankedCandidate> {
        if !outcome.match_found || outcome.candidates.is_empty() {
            return Vec::new();
        }

        let max_score = outcome
            .candidates
            .iter()
            .fold(0.0_f64, |max, c| max.max(c.score));

        outcome
            .candidates
            .iter()
            .map(|candidate| {
                let confidence_percent = if max_score > 0.0 {
                    round1(candidate.score / max_score * 100.0)
                } else {
                    0.0
                };
                RankedCandidate {
                    candidate: candidate.clone(),
                    confidence_percent,
                }
            })
            .collect()
    }

    /// Embeddable player URL for a candidate's source link, when a video id
    /// can be recognized. `None` just means the caller omits the embed line.
    pub fn embed_reference(&self, source_url: &str) -> Option<String> {
        self.video_id
            .captures(source_url)
            .and_then(|caps| caps.get(1))
            .map(|id| format!("https://www.youtube.com/embed/{}", id.as_str()))
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            song_id: id.to_string(),
            title: format!("Song {id}"),
            channel: "Channel".to_string(),
            source_url: format!("https://www.youtube.com/watch?v=vid_{id}"),
            score,
            time_offset_secs: 1.5,
        }
    }

    fn found(candidates: Vec<Candidate>) -> AudioOutcome {
        AudioOutcome {
            match_found: true,
            candidates,
            error_message: None,
        }
    }

    #[test]
    fn test_relative_confidence() {
        let ranker = Ranker::new();
        let outcome = found(vec![
            candidate("a", 500.0),
            candidate("b", 300.0),
            candidate("c", 100.0),
        ]);

        let ranked = ranker.rank(&outcome);
        let confidences: Vec<f64> = ranked.iter().map(|r| r.confidence_percent).collect();
        assert_eq!(confidences, vec![100.0, 60.0, 20.0]);

        // slot order survives ranking
        let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.song_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_scores() {
        let ranker = Ranker::new();
        let outcome = found(vec![candidate("a", 40.0), candidate("b", 40.0)]);

        let ranked = ranker.rank(&outcome);
        assert_eq!(ranked[0].confidence_percent, 100.0);
        assert_eq!(ranked[1].confidence_percent, 100.0);
    }

    #[test]
    fn test_one_decimal_rounding() {
        let ranker = Ranker::new();
        let outcome = found(vec![candidate("a", 3.0), candidate("b", 1.0)]);

        let ranked = ranker.rank(&outcome);
        assert_eq!(ranked[1].confidence_percent, 33.3);
    }

    #[test]
    fn test_all_zero_scores() {
        let ranker = Ranker::new();
        let outcome = found(vec![candidate("a", 0.0), candidate("b", 0.0)]);

        let ranked = ranker.rank(&outcome);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.confidence_percent == 0.0));
    }

    #[test]
    fn test_no_match_is_empty() {
        let ranker = Ranker::new();
        let outcome = AudioOutcome {
            match_found: false,
            candidates: vec![candidate("a", 10.0)],
            error_message: Some("Low confidence match.".to_string()),
        };

        assert!(ranker.rank(&outcome).is_empty());
        assert!(ranker.rank(&found(Vec::new())).is_empty());
    }

    #[test]
    fn test_embed_reference_forms() {
        let ranker = Ranker::new();

        assert_eq!(
            ranker.embed_reference("https://youtu.be/abc123"),
            Some("https://www.youtube.com/embed/abc123".to_string())
        );
        assert_eq!(
            ranker.embed_reference("https://www.youtube.com/watch?v=abc123&t=5"),
            Some("https://www.youtube.com/embed/abc123".to_string())
        );
        assert_eq!(
            ranker.embed_reference("https://youtu.be/abc123?t=30"),
            Some("https://www.youtube.com/embed/abc123".to_string())
        );
    }

    #[test]
    fn test_embed_reference_unrecognized() {
        let ranker = Ranker::new();

        assert_eq!(ranker.embed_reference("https://example.com/x"), None);
        assert_eq!(ranker.embed_reference(""), None);
    }
}
