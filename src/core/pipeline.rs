// Classifier pipeline. Composes an ordered list of detectors into one
// aggregate verdict.
//
// Detector identity is never baked into the pipeline (Design Note "Dynamic
// dispatch over detectors"): it only knows about `Box<dyn Detector>`, so
// adding a new heuristic is purely a construction-time concern.

use super::types::{Request, Response};
use std::sync::Arc;
use std::time::Duration;

/// A pure function `Request -> Response`. Implementors must be safe to call
/// concurrently; the pipeline gives no ordering guarantee across requests.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, req: &Request) -> Response;
}

/// Lets a detector kept alive elsewhere (e.g. for direct training calls from
/// `main`) also be handed to the pipeline by reference-counted handle rather
/// than by exclusive ownership.
impl<T: Detector + ?Sized> Detector for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn check(&self, req: &Request) -> Response {
        (**self).check(req)
    }
}

/// Detectors that can be updated from labeled examples. The training
/// algorithm itself is left to each implementation; this trait only
/// requires that a trainable detector can absorb one labeled sample at a
/// time without blocking the classification path.
pub trait Trainable: Detector {
    fn update_spam(&self, sample: &str);
    fn update_ham(&self, sample: &str);
}

/// Aggregated pipeline output before the dispatcher turns it into a
/// `Verdict` (the dispatcher still needs chat/user ids the pipeline doesn't
/// see, so this is an intermediate type).
pub struct PipelineResult {
    pub checks: Vec<Response>,
    pub spam: bool,
}

pub struct Pipeline {
    detectors: Vec<Box<dyn Detector>>,
    /// Collect every detector's response even after the first spam verdict.
    /// Defaults to `true`.
    pub collect_all: bool,
    pub ban_interval: Duration,
}

impl Pipeline {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            detectors,
            collect_all: true,
            ban_interval: Duration::ZERO,
        }
    }

    pub fn with_ban_interval(mut self, ban_interval: Duration) -> Self {
        self.ban_interval = ban_interval;
        self
    }

    pub fn check(&self, req: &Request) -> PipelineResult {
        let mut checks = Vec::with_capacity(self.detectors.len());
        let mut spam = false;

        for detector in &self.detectors {
            let response = detector.check(req);
            if response.spam {
                spam = true;
            }
            checks.push(response);
            if spam && !self.collect_all {
                break;
            }
        }

        PipelineResult { checks, spam }
    }
}

/// Substring stop-phrase matcher backed by a dictionary store snapshot. The
/// simplest possible detector beyond the duplicate detector, included so the
/// pipeline's "treat every detector uniformly" contract has more than one
/// real implementation exercising it.
pub struct StopPhraseDetector {
    phrases: Vec<String>,
}

impl StopPhraseDetector {
    pub fn new(phrases: Vec<String>) -> Self {
        Self {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl Detector for StopPhraseDetector {
    fn name(&self) -> &str {
        "stop_phrase"
    }

    fn check(&self, req: &Request) -> Response {
        let lower = req.msg.to_lowercase();
        match self.phrases.iter().find(|p| lower.contains(p.as_str())) {
            Some(p) => Response::spam("stop_phrase", format!("contains stop phrase \"{p}\"")),
            None => Response::not_spam("stop_phrase", "no stop phrase matched"),
        }
    }
}

/// A frequency-weighted token scorer, the simplest thing that can honestly
/// call itself "trained from examples" without committing to any particular
/// ML algorithm. Every token seen in a spam sample increments its weight;
/// every token seen in a ham sample decrements it. A message is spam if its
/// average token weight crosses a threshold.
pub struct KeywordWeightDetector {
    weights: dashmap::DashMap<String, i32>,
    threshold: i32,
}

impl KeywordWeightDetector {
    pub fn new(threshold: i32) -> Self {
        Self {
            weights: dashmap::DashMap::new(),
            threshold,
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl Detector for KeywordWeightDetector {
    fn name(&self) -> &str {
        "keyword_weight"
    }

    fn check(&self, req: &Request) -> Response {
        let tokens = Self::tokens(&req.msg);
        if tokens.is_empty() {
            return Response::not_spam("keyword_weight", "no scorable tokens");
        }
        let sum: i32 = tokens
            .iter()
            .map(|t| self.weights.get(t).map(|w| *w).unwrap_or(0))
            .sum();
        if sum >= self.threshold {
            Response::spam("keyword_weight", format!("token score {sum} >= {}", self.threshold))
        } else {
            Response::not_spam("keyword_weight", format!("token score {sum}"))
        }
    }
}

impl Trainable for KeywordWeightDetector {
    fn update_spam(&self, sample: &str) {
        for token in Self::tokens(sample) {
            *self.weights.entry(token).or_insert(0) += 1;
        }
    }

    fn update_ham(&self, sample: &str) {
        for token in Self::tokens(sample) {
            *self.weights.entry(token).or_insert(0) -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_collects_all_responses_by_default() {
        let pipeline = Pipeline::new(vec![
            Box::new(StopPhraseDetector::new(vec!["buy now".into()])),
            Box::new(KeywordWeightDetector::new(100)),
        ]);
        let result = pipeline.check(&Request::new("please buy now", "1"));
        assert!(result.spam);
        assert_eq!(result.checks.len(), 2);
    }

    #[test]
    fn keyword_detector_learns_from_training() {
        let detector = KeywordWeightDetector::new(3);
        for _ in 0..4 {
            detector.update_spam("free crypto giveaway");
        }
        let hot = detector.check(&Request::new("free crypto giveaway now", "1"));
        assert!(hot.spam);

        detector.update_ham("free crypto giveaway");
        detector.update_ham("free crypto giveaway");
        let cooled = detector.check(&Request::new("free crypto giveaway now", "1"));
        assert!(!cooled.spam);
    }

    #[test]
    fn stop_phrase_detector_is_case_insensitive() {
        let detector = StopPhraseDetector::new(vec!["Discord.gg".into()]);
        let response = detector.check(&Request::new("join my discord.gg/abc", "1"));
        assert!(response.spam);
    }
}
