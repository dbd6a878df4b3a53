// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Decide-once-commit early classification over a checkpoint schedule.
//!
//! `EarlyClassifier` wraps a [`ProbabilityProvider`] with per-checkpoint
//! safety scorers and a calibrated decision threshold. An instance is
//! decided the first time its safety score reaches the threshold; the final
//! checkpoint always decides.

use etsc_core::{
    CheckpointSchedule, DecisionState, EtscError, ExecutionContext, ProbabilityProvider,
    ScheduleSpec, SeriesBatchView,
};
use etsc_eval::{EarlyScore, FinalDecision};
use rayon::prelude::*;
use std::time::Instant;

use crate::safety::{extract_features, SafetyScorer};

/// Configuration for [`EarlyClassifier`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EarlyClassifierConfig {
    /// Checkpoint layout, resolved against the training length at fit time.
    pub schedule: ScheduleSpec,
    /// Number of quantile candidates swept during threshold calibration.
    pub threshold_grid: usize,
}

impl Default for EarlyClassifierConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleSpec::default(),
            threshold_grid: 32,
        }
    }
}

impl EarlyClassifierConfig {
    pub fn validate(&self) -> Result<(), EtscError> {
        if self.threshold_grid == 0 {
            return Err(EtscError::invalid_input("threshold_grid must be >= 1"));
        }
        Ok(())
    }
}

/// Fitted decision head: everything the checkpoint walk needs beyond the
/// provider itself.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FittedHead {
    pub schedule: CheckpointSchedule,
    pub scorers: Vec<SafetyScorer>,
    pub threshold: f64,
    pub n_classes: usize,
}

impl FittedHead {
    /// Checks structural consistency of a caller-supplied head.
    pub fn validate(&self) -> Result<(), EtscError> {
        if self.scorers.len() != self.schedule.n_checkpoints() {
            return Err(EtscError::invalid_input(format!(
                "head has {} scorers for {} checkpoints",
                self.scorers.len(),
                self.schedule.n_checkpoints()
            )));
        }
        if self.n_classes == 0 {
            return Err(EtscError::invalid_input("head requires n_classes >= 1"));
        }
        if self.threshold.is_nan() {
            return Err(EtscError::invalid_input("head threshold must not be NaN"));
        }
        Ok(())
    }
}

/// Result of evaluating one checkpoint for a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Effective probability row per instance: the committed vector for
    /// decided instances, the fresh provider output otherwise.
    pub probabilities: Vec<Vec<f64>>,
    /// Decision flag per instance after this checkpoint.
    pub decided: Vec<bool>,
    /// Updated per-instance states to carry into the next checkpoint.
    pub states: Vec<DecisionState>,
}

/// Early classifier over a pluggable probability provider.
pub struct EarlyClassifier<P: ProbabilityProvider> {
    config: EarlyClassifierConfig,
    provider: P,
    head: Option<FittedHead>,
}

impl<P: ProbabilityProvider> EarlyClassifier<P> {
    pub fn new(config: EarlyClassifierConfig, provider: P) -> Result<Self, EtscError> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            head: None,
        })
    }

    pub fn config(&self) -> &EarlyClassifierConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn head(&self) -> Option<&FittedHead> {
        self.head.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.head.is_some()
    }

    fn fitted_head(&self) -> Result<&FittedHead, EtscError> {
        self.head
            .as_ref()
            .ok_or_else(|| EtscError::unfitted_model("call fit or restore a head first"))
    }

    /// Installs an externally restored head.
    ///
    /// The head must be structurally valid and agree with the provider's
    /// fitted class count.
    pub fn restore_head(&mut self, head: FittedHead) -> Result<(), EtscError> {
        head.validate()?;
        if let Some(n_classes) = self.provider.n_classes() {
            if n_classes != head.n_classes {
                return Err(EtscError::dimension_mismatch(format!(
                    "head expects {} classes, provider is fitted with {n_classes}",
                    head.n_classes
                )));
            }
        }
        self.head = Some(head);
        Ok(())
    }

    /// Trains the provider, fits one safety scorer per checkpoint, and
    /// calibrates the decision threshold on the training walk.
    pub fn fit(
        &mut self,
        train: &SeriesBatchView<'_>,
        labels: &[usize],
        ctx: &ExecutionContext<'_>,
    ) -> Result<(), EtscError> {
        if labels.len() != train.n_instances {
            return Err(EtscError::invalid_input(format!(
                "got {} labels for {} training instances",
                labels.len(),
                train.n_instances
            )));
        }

        self.head = None;
        self.provider.fit(train, labels, ctx)?;
        let n_classes = self.provider.n_classes().ok_or_else(|| {
            EtscError::unfitted_model("provider reported no class count after fit")
        })?;
        for (index, &label) in labels.iter().enumerate() {
            if label >= n_classes {
                return Err(EtscError::invalid_input(format!(
                    "labels[{index}]={label} out of range for {n_classes} classes"
                )));
            }
        }

        let schedule = self.config.schedule.resolve(train.len)?;
        let owned = train.to_owned_batch();
        let n_checkpoints = schedule.n_checkpoints();
        let n_instances = train.n_instances;

        // Training walk: per-checkpoint features, predictions, and scores.
        let mut scorers = Vec::with_capacity(n_checkpoints);
        let mut scores = vec![vec![0.0f64; n_instances]; n_checkpoints];
        let mut predictions = vec![vec![0usize; n_instances]; n_checkpoints];
        let mut previous: Vec<Option<usize>> = vec![None; n_instances];

        for (position, &len) in schedule.lengths().iter().enumerate() {
            ctx.check_cancelled()?;
            let prefix = owned.truncate_to(len)?;
            let probs = self.provider.predict_proba(&prefix.view(), ctx)?;
            probs.ensure_shape(n_instances, n_classes)?;

            let mut features = Vec::with_capacity(n_instances);
            let mut correct = Vec::with_capacity(n_instances);
            for instance in 0..n_instances {
                let (f, predicted) = extract_features(probs.row(instance), previous[instance])?;
                correct.push(predicted == labels[instance]);
                predictions[position][instance] = predicted;
                previous[instance] = Some(predicted);
                features.push(f);
            }

            let scorer = SafetyScorer::fit(&features, &correct)?;
            for instance in 0..n_instances {
                scores[position][instance] = scorer.score(&features[instance]);
            }
            scorers.push(scorer);
        }

        let threshold = calibrate_threshold(
            &schedule,
            &scores,
            &predictions,
            labels,
            self.config.threshold_grid,
        )?;

        self.head = Some(FittedHead {
            schedule,
            scorers,
            threshold,
            n_classes,
        });
        Ok(())
    }

    /// Evaluates one checkpoint for a batch truncated to a scheduled length.
    ///
    /// Pure with respect to its inputs: decided states pass through
    /// unchanged and replaying the same call yields the same outcome.
    pub fn predict_at(
        &self,
        batch: &SeriesBatchView<'_>,
        states: &[DecisionState],
        ctx: &ExecutionContext<'_>,
    ) -> Result<StepOutcome, EtscError> {
        let head = self.fitted_head()?;
        if states.len() != batch.n_instances {
            return Err(EtscError::invalid_input(format!(
                "got {} states for a batch of {} instances",
                states.len(),
                batch.n_instances
            )));
        }
        for (instance, state) in states.iter().enumerate() {
            state.validate()?;
            if !state.probabilities.is_empty() && state.probabilities.len() != head.n_classes {
                return Err(EtscError::dimension_mismatch(format!(
                    "state[{instance}] carries {} probabilities, model was fitted with {} classes",
                    state.probabilities.len(),
                    head.n_classes
                )));
            }
        }
        let position = head.schedule.require_position(batch.len)?;
        ctx.check_cancelled()?;

        let probs = self.provider.predict_proba(batch, ctx)?;
        probs.ensure_shape(batch.n_instances, head.n_classes)?;

        let final_checkpoint = head.schedule.is_final(position);
        let mut probabilities = Vec::with_capacity(states.len());
        let mut decided = Vec::with_capacity(states.len());
        let mut next_states = Vec::with_capacity(states.len());

        for (instance, state) in states.iter().enumerate() {
            if state.decided {
                probabilities.push(state.probabilities.clone());
                decided.push(true);
                next_states.push(state.clone());
                continue;
            }

            let previous = state.last_checkpoint.map(|_| state.predicted);
            let (features, predicted) = extract_features(probs.row(instance), previous)?;
            let score = head.scorers[position].score(&features);

            let mut next = state.clone();
            next.last_checkpoint = Some(position);
            next.probabilities = probs.row(instance).to_vec();
            next.predicted = predicted;
            next.safety_score = score;
            if final_checkpoint || score >= head.threshold {
                next.decided = true;
                next.decided_at_len = Some(batch.len);
            }

            probabilities.push(next.probabilities.clone());
            decided.push(next.decided);
            next_states.push(next);
        }

        Ok(StepOutcome {
            probabilities,
            decided,
            states: next_states,
        })
    }

    /// Simulates the checkpoint walk from the first checkpoint up to the
    /// batch length, stopping early once every instance is decided.
    ///
    /// The batch length must align to a checkpoint; instances still pending
    /// after a partial-length walk carry their states out for later calls or
    /// [`EarlyClassifier::finalize`].
    pub fn predict(
        &self,
        batch: &SeriesBatchView<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<DecisionState>, EtscError> {
        let head = self.fitted_head()?;
        let last_position = head.schedule.require_position(batch.len)?;

        let owned = batch.to_owned_batch();
        let mut states = vec![DecisionState::fresh(); batch.n_instances];
        let started_at = Instant::now();

        for (evals, position) in (0..=last_position).enumerate() {
            ctx.check_checkpoint_budget(evals + 1)?;
            ctx.check_time_budget(started_at)?;
            let prefix = owned.truncate_to(head.schedule.length_at(position))?;
            let outcome = self.predict_at(&prefix.view(), &states, ctx)?;
            states = outcome.states;
            if states.iter().all(|state| state.decided) {
                break;
            }
        }

        Ok(states)
    }

    /// Converts per-instance states into final decisions.
    ///
    /// Decided states commit as-is. A pending state that has visited at
    /// least one checkpoint commits its latest prediction at the last
    /// visited length; a pending state that never visited a checkpoint is
    /// an error.
    pub fn finalize(&self, states: &[DecisionState]) -> Result<Vec<FinalDecision>, EtscError> {
        let head = self.fitted_head()?;
        states
            .iter()
            .enumerate()
            .map(|(instance, state)| {
                state.validate()?;
                if state.decided {
                    let decision_length = state.decided_at_len.ok_or_else(|| {
                        EtscError::invalid_input(format!(
                            "state[{instance}] is decided without a decision length"
                        ))
                    })?;
                    return Ok(FinalDecision {
                        label: state.predicted,
                        decision_length,
                    });
                }

                let Some(position) = state.last_checkpoint else {
                    return Err(EtscError::invalid_input(format!(
                        "state[{instance}] is pending and never visited a checkpoint"
                    )));
                };
                if position >= head.schedule.n_checkpoints() {
                    return Err(EtscError::invalid_input(format!(
                        "state[{instance}] visited checkpoint {position}, schedule has {}",
                        head.schedule.n_checkpoints()
                    )));
                }
                Ok(FinalDecision {
                    label: state.predicted,
                    decision_length: head.schedule.length_at(position),
                })
            })
            .collect()
    }

    /// Runs the full walk over a labelled full-length batch and scores the
    /// decisions.
    pub fn score(
        &self,
        batch: &SeriesBatchView<'_>,
        truth: &[usize],
        ctx: &ExecutionContext<'_>,
    ) -> Result<EarlyScore, EtscError> {
        let full_length = self.fitted_head()?.schedule.full_length();
        if batch.len != full_length {
            return Err(EtscError::length_mismatch(format!(
                "score requires full-length series; got len={}, full_length={full_length}",
                batch.len
            )));
        }
        if truth.len() != batch.n_instances {
            return Err(EtscError::invalid_input(format!(
                "got {} labels for a batch of {} instances",
                truth.len(),
                batch.n_instances
            )));
        }

        let states = self.predict(batch, ctx)?;
        let decisions = self.finalize(&states)?;
        etsc_eval::early_score(&decisions, truth, full_length)
    }
}

/// Picks the threshold maximizing the harmonic-mean score of a simulated
/// training walk over quantile candidates. Ties resolve to the lower
/// threshold; an empty candidate pool yields positive infinity, which defers
/// every decision to the final checkpoint.
fn calibrate_threshold(
    schedule: &CheckpointSchedule,
    scores: &[Vec<f64>],
    predictions: &[Vec<usize>],
    labels: &[usize],
    grid: usize,
) -> Result<f64, EtscError> {
    let mut pool = Vec::new();
    for (position, row) in scores.iter().enumerate() {
        if schedule.is_final(position) {
            continue;
        }
        pool.extend(row.iter().copied().filter(|score| score.is_finite()));
    }
    if pool.is_empty() {
        return Ok(f64::INFINITY);
    }
    pool.sort_by(f64::total_cmp);

    let mut candidates = Vec::with_capacity(grid);
    for step in 0..grid {
        let rank = if grid == 1 {
            0
        } else {
            step * (pool.len() - 1) / (grid - 1)
        };
        candidates.push(pool[rank]);
    }
    candidates.dedup_by(|a, b| a == b);

    let evaluated = candidates
        .par_iter()
        .map(|&threshold| {
            simulated_harmonic_mean(schedule, scores, predictions, labels, threshold)
                .map(|hm| (threshold, hm))
        })
        .collect::<Result<Vec<_>, EtscError>>()?;

    // Candidates are ascending, so strict improvement keeps the lowest
    // threshold on ties.
    let mut best_threshold = f64::INFINITY;
    let mut best_hm = f64::NEG_INFINITY;
    for &(threshold, hm) in &evaluated {
        if hm > best_hm {
            best_threshold = threshold;
            best_hm = hm;
        }
    }
    Ok(best_threshold)
}

fn simulated_harmonic_mean(
    schedule: &CheckpointSchedule,
    scores: &[Vec<f64>],
    predictions: &[Vec<usize>],
    labels: &[usize],
    threshold: f64,
) -> Result<f64, EtscError> {
    let last = schedule.n_checkpoints() - 1;
    let mut decisions = Vec::with_capacity(labels.len());
    for instance in 0..labels.len() {
        let mut decision = FinalDecision {
            label: predictions[last][instance],
            decision_length: schedule.full_length(),
        };
        for position in 0..last {
            if scores[position][instance] >= threshold {
                decision = FinalDecision {
                    label: predictions[position][instance],
                    decision_length: schedule.length_at(position),
                };
                break;
            }
        }
        decisions.push(decision);
    }

    let score = etsc_eval::early_score(&decisions, labels, schedule.full_length())?;
    Ok(score.harmonic_mean)
}

#[cfg(test)]
mod tests {
    use super::{
        calibrate_threshold, EarlyClassifier, EarlyClassifierConfig, FittedHead, StepOutcome,
    };
    use crate::safety::SafetyScorer;
    use etsc_core::{
        CheckpointSchedule, Constraints, DecisionState, EtscError, ExecutionContext,
        ProbabilityMatrix, ProbabilityProvider, ScheduleSpec, SeriesBatch, SeriesBatchView,
    };

    /// Provider returning a fixed probability row per instance regardless of
    /// prefix length.
    struct FixedRowProvider {
        rows: Vec<Vec<f64>>,
        n_classes: Option<usize>,
    }

    impl FixedRowProvider {
        fn new(rows: Vec<Vec<f64>>) -> Self {
            let n_classes = rows.first().map(Vec::len);
            Self { rows, n_classes }
        }
    }

    impl ProbabilityProvider for FixedRowProvider {
        fn fit(
            &mut self,
            _train: &SeriesBatchView<'_>,
            _labels: &[usize],
            _ctx: &ExecutionContext<'_>,
        ) -> Result<(), EtscError> {
            Ok(())
        }

        fn n_classes(&self) -> Option<usize> {
            self.n_classes
        }

        fn predict_proba(
            &self,
            batch: &SeriesBatchView<'_>,
            _ctx: &ExecutionContext<'_>,
        ) -> Result<ProbabilityMatrix, EtscError> {
            let n_classes = self.n_classes.ok_or_else(|| {
                EtscError::unfitted_model("fixed-row provider has no rows")
            })?;
            let values = (0..batch.n_instances)
                .flat_map(|instance| self.rows[instance % self.rows.len()].clone())
                .collect();
            ProbabilityMatrix::new(values, batch.n_instances, n_classes)
        }
    }

    fn gaussian_scorer() -> SafetyScorer {
        SafetyScorer::Gaussian {
            mean: [0.8, 0.6, 0.0],
            var: [0.01, 0.01, 0.01],
        }
    }

    fn head_with(threshold: f64, scorer: SafetyScorer) -> FittedHead {
        let schedule =
            CheckpointSchedule::from_lengths(vec![2, 4, 6], 6).expect("schedule should be valid");
        let scorers = vec![scorer.clone(), scorer.clone(), scorer];
        FittedHead {
            schedule,
            scorers,
            threshold,
            n_classes: 2,
        }
    }

    fn classifier_with(threshold: f64, scorer: SafetyScorer) -> EarlyClassifier<FixedRowProvider> {
        let provider = FixedRowProvider::new(vec![vec![0.9, 0.1], vec![0.2, 0.8]]);
        let mut classifier = EarlyClassifier::new(EarlyClassifierConfig::default(), provider)
            .expect("default config is valid");
        classifier
            .restore_head(head_with(threshold, scorer))
            .expect("head should restore");
        classifier
    }

    fn batch_of(n_instances: usize, len: usize) -> SeriesBatch {
        SeriesBatch::new(vec![0.0; n_instances * len], n_instances, len, 1)
            .expect("batch should be valid")
    }

    #[test]
    fn config_rejects_zero_threshold_grid() {
        let config = EarlyClassifierConfig {
            schedule: ScheduleSpec::default(),
            threshold_grid: 0,
        };
        assert!(config.validate().is_err());
        let provider = FixedRowProvider::new(vec![vec![1.0]]);
        assert!(EarlyClassifier::new(config, provider).is_err());
    }

    #[test]
    fn unfitted_classifier_refuses_inference() {
        let provider = FixedRowProvider::new(vec![vec![0.9, 0.1]]);
        let classifier = EarlyClassifier::new(EarlyClassifierConfig::default(), provider)
            .expect("default config is valid");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let batch = batch_of(1, 6);

        assert!(!classifier.is_fitted());
        let err = classifier
            .predict(&batch.view(), &ctx)
            .expect_err("unfitted predict must fail");
        assert!(matches!(err, EtscError::UnfittedModel(_)));
        assert!(classifier.finalize(&[DecisionState::fresh()]).is_err());
    }

    #[test]
    fn restore_head_rejects_inconsistent_heads() {
        let provider = FixedRowProvider::new(vec![vec![0.9, 0.1]]);
        let mut classifier = EarlyClassifier::new(EarlyClassifierConfig::default(), provider)
            .expect("default config is valid");

        let mut short = head_with(0.0, SafetyScorer::NeverSafe);
        short.scorers.pop();
        assert!(classifier.restore_head(short).is_err());

        let mut nan = head_with(0.0, SafetyScorer::NeverSafe);
        nan.threshold = f64::NAN;
        assert!(classifier.restore_head(nan).is_err());

        let mut wrong_classes = head_with(0.0, SafetyScorer::NeverSafe);
        wrong_classes.n_classes = 3;
        let err = classifier
            .restore_head(wrong_classes)
            .expect_err("class mismatch must fail");
        assert!(matches!(err, EtscError::DimensionMismatch(_)));
    }

    #[test]
    fn predict_at_rejects_state_count_mismatch_and_unaligned_lengths() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);

        let batch = batch_of(2, 2);
        let err = classifier
            .predict_at(&batch.view(), &[DecisionState::fresh()], &ctx)
            .expect_err("state count mismatch must fail");
        assert!(matches!(err, EtscError::InvalidInput(_)));

        let unaligned = batch_of(2, 3);
        let states = vec![DecisionState::fresh(); 2];
        let err = classifier
            .predict_at(&unaligned.view(), &states, &ctx)
            .expect_err("unaligned length must fail");
        assert!(matches!(err, EtscError::LengthMismatch(_)));
    }

    #[test]
    fn predict_at_rejects_states_with_the_wrong_probability_width() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);

        let wide = DecisionState {
            last_checkpoint: Some(0),
            probabilities: vec![0.5, 0.3, 0.2],
            predicted: 0,
            decided: false,
            decided_at_len: None,
            safety_score: -1.0,
        };
        let err = classifier
            .predict_at(&batch_of(2, 4).view(), &[wide, DecisionState::fresh()], &ctx)
            .expect_err("three-class state against a two-class head must fail");
        assert!(matches!(err, EtscError::DimensionMismatch(_)));
    }

    #[test]
    fn never_safe_scorers_defer_every_decision_to_the_final_checkpoint() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let batch = batch_of(2, 6);

        let states = classifier
            .predict(&batch.view(), &ctx)
            .expect("predict should succeed");
        for state in &states {
            assert!(state.decided);
            assert_eq!(state.decided_at_len, Some(6));
            assert_eq!(state.last_checkpoint, Some(2));
        }
        assert_eq!(states[0].predicted, 0);
        assert_eq!(states[1].predicted, 1);
    }

    #[test]
    fn minus_infinity_threshold_decides_at_the_first_checkpoint() {
        let classifier = classifier_with(f64::NEG_INFINITY, gaussian_scorer());
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let batch = batch_of(2, 6);

        let states = classifier
            .predict(&batch.view(), &ctx)
            .expect("predict should succeed");
        for state in &states {
            assert!(state.decided);
            assert_eq!(state.decided_at_len, Some(2));
            assert_eq!(state.last_checkpoint, Some(0));
        }
    }

    #[test]
    fn decided_states_pass_through_checkpoints_unchanged() {
        let classifier = classifier_with(f64::NEG_INFINITY, gaussian_scorer());
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);

        let first = classifier
            .predict_at(
                &batch_of(2, 2).view(),
                &vec![DecisionState::fresh(); 2],
                &ctx,
            )
            .expect("first checkpoint should succeed");
        assert!(first.decided.iter().all(|&d| d));

        let second = classifier
            .predict_at(&batch_of(2, 4).view(), &first.states, &ctx)
            .expect("second checkpoint should succeed");
        assert_eq!(second.states, first.states);
        assert_eq!(second.probabilities, first.probabilities);
    }

    #[test]
    fn replaying_a_checkpoint_yields_an_identical_outcome() {
        let classifier = classifier_with(0.0, gaussian_scorer());
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let batch = batch_of(2, 4);
        let states = vec![DecisionState::fresh(); 2];

        let first: StepOutcome = classifier
            .predict_at(&batch.view(), &states, &ctx)
            .expect("checkpoint should succeed");
        let second = classifier
            .predict_at(&batch.view(), &states, &ctx)
            .expect("replay should succeed");
        assert_eq!(first, second);
    }

    #[test]
    fn partial_length_predict_walks_up_to_the_given_checkpoint() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);

        // Aligned partial length: walk stops before the final checkpoint,
        // so NeverSafe scorers leave everything pending.
        let states = classifier
            .predict(&batch_of(2, 4).view(), &ctx)
            .expect("aligned partial length should succeed");
        for state in &states {
            assert!(!state.decided);
            assert_eq!(state.last_checkpoint, Some(1));
        }

        let err = classifier
            .predict(&batch_of(2, 3).view(), &ctx)
            .expect_err("unaligned length must fail");
        assert!(matches!(err, EtscError::LengthMismatch(_)));

        let err = classifier
            .score(&batch_of(2, 4).view(), &[0, 1], &ctx)
            .expect_err("score requires full length");
        assert!(matches!(err, EtscError::LengthMismatch(_)));
    }

    #[test]
    fn finalize_commits_pending_states_at_their_last_visited_checkpoint() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let pending = DecisionState {
            last_checkpoint: Some(1),
            probabilities: vec![0.6, 0.4],
            predicted: 0,
            decided: false,
            decided_at_len: None,
            safety_score: -3.0,
        };

        let decisions = classifier
            .finalize(&[pending])
            .expect("pending visited state should finalize");
        assert_eq!(decisions[0].label, 0);
        assert_eq!(decisions[0].decision_length, 4);
    }

    #[test]
    fn finalize_rejects_states_that_never_visited_a_checkpoint() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let err = classifier
            .finalize(&[DecisionState::fresh()])
            .expect_err("unvisited pending state must fail");
        assert!(matches!(err, EtscError::InvalidInput(_)));
    }

    #[test]
    fn checkpoint_budget_aborts_the_walk() {
        let classifier = classifier_with(0.0, SafetyScorer::NeverSafe);
        let constraints = Constraints {
            max_checkpoint_evals: Some(1),
            ..Constraints::default()
        };
        let ctx = ExecutionContext::new(&constraints);

        let err = classifier
            .predict(&batch_of(2, 6).view(), &ctx)
            .expect_err("budget of one checkpoint must fail");
        assert!(matches!(err, EtscError::ResourceLimit(_)));
    }

    #[test]
    fn calibration_prefers_the_threshold_with_the_best_harmonic_mean() {
        let schedule =
            CheckpointSchedule::from_lengths(vec![50, 100, 150], 150).expect("valid schedule");
        let labels = [0usize, 1];
        // Instance 0 is correct everywhere; instance 1 flips to correct at
        // the second checkpoint.
        let predictions = vec![vec![0, 0], vec![0, 1], vec![0, 1]];
        let scores = vec![vec![5.0, 1.0], vec![5.0, 5.0], vec![5.0, 5.0]];

        let threshold = calibrate_threshold(&schedule, &scores, &predictions, &labels, 4)
            .expect("calibration should succeed");
        // threshold 1.0: both decide at 50, accuracy 1/2, hm = 4/7.
        // threshold 5.0: decisions at 50 and 100, accuracy 1, hm = 2/3.
        assert_eq!(threshold, 5.0);
    }

    #[test]
    fn calibration_with_no_finite_scores_defers_to_the_final_checkpoint() {
        let schedule =
            CheckpointSchedule::from_lengths(vec![50, 100], 100).expect("valid schedule");
        let labels = [0usize];
        let predictions = vec![vec![0], vec![0]];
        let scores = vec![vec![f64::NEG_INFINITY], vec![f64::NEG_INFINITY]];

        let threshold = calibrate_threshold(&schedule, &scores, &predictions, &labels, 8)
            .expect("calibration should succeed");
        assert_eq!(threshold, f64::INFINITY);
    }

    #[test]
    fn fit_validates_label_count_and_range() {
        let provider = FixedRowProvider::new(vec![vec![0.9, 0.1]]);
        let mut classifier = EarlyClassifier::new(
            EarlyClassifierConfig {
                schedule: ScheduleSpec::Explicit {
                    lengths: vec![2, 4, 6],
                },
                threshold_grid: 4,
            },
            provider,
        )
        .expect("config is valid");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let batch = batch_of(2, 6);

        assert!(classifier.fit(&batch.view(), &[0], &ctx).is_err());
        assert!(classifier.fit(&batch.view(), &[0, 7], &ctx).is_err());
        assert!(classifier.fit(&batch.view(), &[0, 1], &ctx).is_ok());
        assert!(classifier.is_fitted());
    }
}
