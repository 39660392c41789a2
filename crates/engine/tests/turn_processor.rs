//! End-to-end behaviour of the turn processor: the turn pipeline, compliance
//! overrides, validation repair, collaborator failures and session lifecycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use settle_core::{
    Action, CallOutcome, ConversationContext, DebtProfile, Directive, DirectiveMode, FsmState, OutcomeSignal,
    ValidatorFailure,
};
use settle_engine::{
    ActionSelector, CollaboratorError, Collaborators, EngineConfig, KeywordClassifier, LearnerConfig, PolicyHandle,
    ResponseGenerator, RuleValidator, SessionSpec, TemplateGenerator, TemplateLibrary, TurnError, TurnProcessor,
    ValidationReport, Validator,
};
use settle_storage::{EpisodeFilter, EpisodeRecorder, InMemoryRecorder};

// -- Helpers --

fn debt() -> DebtProfile {
    DebtProfile {
        creditor: "Acme Bank".to_string(),
        balance: Decimal::new(125_000, 2),
        days_past_due: 75,
        currency: "USD".to_string(),
    }
}

fn untrained_policy() -> Arc<PolicyHandle> {
    Arc::new(PolicyHandle::new(ActionSelector::new(&LearnerConfig::default())))
}

fn library() -> Arc<TemplateLibrary> {
    Arc::new(TemplateLibrary::builtin())
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_backoff_ms: 1,
        ..EngineConfig::default()
    }
}

fn spec(jurisdiction: &str) -> SessionSpec {
    SessionSpec::new(jurisdiction, debt()).with_id("s-1").at_minute(10 * 60)
}

fn reference_processor(config: EngineConfig) -> TurnProcessor {
    TurnProcessor::new(config, untrained_policy(), Collaborators::reference(library()))
}

fn with_generator(config: EngineConfig, generator: Arc<dyn ResponseGenerator>) -> TurnProcessor {
    let collaborators = Collaborators {
        generator,
        validator: Arc::new(RuleValidator::new(library())),
        classifier: Arc::new(KeywordClassifier::new()),
    };
    TurnProcessor::new(config, untrained_policy(), collaborators)
}

fn with_validator(config: EngineConfig, generator: Arc<dyn ResponseGenerator>, validator: Arc<dyn Validator>) -> TurnProcessor {
    let collaborators = Collaborators {
        generator,
        validator,
        classifier: Arc::new(KeywordClassifier::new()),
    };
    TurnProcessor::new(config, untrained_policy(), collaborators)
}

async fn wait_for_records(recorder: &InMemoryRecorder, expected: usize) {
    for _ in 0..200 {
        if recorder.len().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} recorded episodes, found {}", expected, recorder.len().await);
}

/// Template generator that remembers the directive mode of every call.
struct ModeRecordingGenerator {
    inner: TemplateGenerator,
    modes: Mutex<Vec<DirectiveMode>>,
}

impl ModeRecordingGenerator {
    fn new() -> Self {
        Self {
            inner: TemplateGenerator::new(library()),
            modes: Mutex::new(Vec::new()),
        }
    }

    fn modes(&self) -> Vec<DirectiveMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for ModeRecordingGenerator {
    async fn generate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<String, CollaboratorError> {
        self.modes.lock().unwrap().push(directive.mode);
        self.inner.generate(ctx, action, directive).await
    }
}

/// Appends a threat to normal output, and to forced output when asked.
struct ThreateningGenerator {
    inner: TemplateGenerator,
    even_when_forced: bool,
}

#[async_trait]
impl ResponseGenerator for ThreateningGenerator {
    async fn generate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<String, CollaboratorError> {
        let text = self.inner.generate(ctx, action, directive).await?;
        if directive.is_forced() && !self.even_when_forced {
            Ok(text)
        } else {
            Ok(format!("{} Otherwise the police will hear about it.", text))
        }
    }
}

struct DownGenerator {
    calls: AtomicU32,
}

#[async_trait]
impl ResponseGenerator for DownGenerator {
    async fn generate(
        &self,
        _ctx: &ConversationContext,
        _action: Action,
        _directive: &Directive,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CollaboratorError::unavailable("llm", "connection refused"))
    }
}

struct SlowGenerator {
    delay: Duration,
    inner: TemplateGenerator,
}

#[async_trait]
impl ResponseGenerator for SlowGenerator {
    async fn generate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<String, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        self.inner.generate(ctx, action, directive).await
    }
}

/// Returns queued reports in order, then passes everything.
struct QueuedValidator {
    reports: Mutex<VecDeque<ValidationReport>>,
}

impl QueuedValidator {
    fn new(reports: Vec<ValidationReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
        }
    }
}

#[async_trait]
impl Validator for QueuedValidator {
    async fn check(
        &self,
        _text: &str,
        _ctx: &ConversationContext,
        _action: Action,
        _directive: &Directive,
    ) -> Result<ValidationReport, CollaboratorError> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ValidationReport::pass))
    }
}

struct DownValidator;

#[async_trait]
impl Validator for DownValidator {
    async fn check(
        &self,
        _text: &str,
        _ctx: &ConversationContext,
        _action: Action,
        _directive: &Directive,
    ) -> Result<ValidationReport, CollaboratorError> {
        Err(CollaboratorError::unavailable("validator", "503"))
    }
}

fn tone_failure(repairable: bool) -> ValidationReport {
    ValidationReport::fail(vec![ValidatorFailure::new("tone", "too pushy")], repairable)
}

// -- Full calls --

#[tokio::test]
async fn cooperative_call_reaches_payment_arrangement() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let processor = reference_processor(fast_config()).with_recorder(recorder.clone());
    let id = processor.start_session(spec("US")).await.unwrap();

    let opening = processor.generate_opening(&id).await.unwrap();
    assert_eq!(opening.trace.emitted_action, Action::Greet);
    assert_eq!(opening.new_state, FsmState::Disclosure);
    assert!(opening.trace.validation.passed);

    let script = [
        ("Hello, who is calling?", FsmState::IdentityVerification),
        ("Okay.", FsmState::IdentityVerification),
        ("Yes, this is me.", FsmState::ConsentRecording),
        ("Yes, this is me.", FsmState::DebtContext),
        ("Yes, that's fine.", FsmState::Negotiation),
        ("Okay, I understand.", FsmState::Negotiation),
        ("Sounds good, I can do that.", FsmState::PaymentSetup),
        ("Okay, thanks.", FsmState::Wrapup),
        ("Thanks, have a good day.", FsmState::EndCall),
    ];
    let mut outputs = Vec::new();
    for (reply, expected) in script {
        let output = processor.process_turn(&id, reply).await.unwrap();
        assert_eq!(output.new_state, expected, "after {:?}", reply);
        outputs.push(output);
    }

    // the disclosure turn reads the jurisdiction's script
    assert!(outputs[0].agent_utterance.contains("attempt to collect a debt"));
    assert!(outputs[0].trace.validation.passed);

    // NEGOTIATION + OFFER_PLAN + AGREEMENT
    let agreed = &outputs[6].trace;
    assert_eq!(agreed.state_before, FsmState::Negotiation);
    assert_eq!(agreed.emitted_action, Action::OfferPlan);
    assert_eq!(agreed.state_after, FsmState::PaymentSetup);
    assert!(agreed.reward.shaping > 0.0);
    assert!(agreed.reward.total > agreed.reward.turn_penalty);

    let last = &outputs[8].trace;
    assert_eq!(last.call_outcome, Some(CallOutcome::PaymentArrangement));
    assert_eq!(last.reward.terminal, 10.0);

    let err = processor.process_turn(&id, "Hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::SessionClosed(_)));

    let traces = processor.session_traces(&id).await.unwrap();
    assert_eq!(traces.len(), 10);
    for (i, trace) in traces.iter().enumerate() {
        assert_eq!(trace.turn_index as usize, i);
        let r = trace.reward;
        assert!((r.total - (r.shaping + r.terminal + r.turn_penalty)).abs() < 1e-9);
    }

    wait_for_records(&recorder, 1).await;
    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.outcome(), CallOutcome::PaymentArrangement);
    assert_eq!(episode.len(), 10);
    assert!(episode.transitions().last().unwrap().done);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let recorded = recorder.query_episodes(&EpisodeFilter::all()).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], episode);
}

#[tokio::test]
async fn each_step_ends_where_the_next_one_is_chosen() {
    let processor = reference_processor(fast_config());
    let id = processor.start_session(spec("US")).await.unwrap();
    processor.generate_opening(&id).await.unwrap();
    for reply in ["Hello, who is calling?", "Okay.", "Yes, this is me.", "I can't afford that.", "hmm"] {
        processor.process_turn(&id, reply).await.unwrap();
    }
    let episode = processor.end_session(&id).await.unwrap();
    let transitions = episode.transitions();
    assert_eq!(transitions.len(), 6);
    for (i, pair) in transitions.windows(2).enumerate() {
        assert_eq!(pair[0].next_state, pair[1].state, "step {}", i);
    }
    // the borrower's reply is part of the chained context
    assert_eq!(transitions[2].next_state.last_signal, OutcomeSignal::IdentityConfirmed);
    assert!(transitions[2].next_state.identity_verified);
}

#[tokio::test]
async fn forced_exit_chains_from_the_last_chosen_step() {
    let config = EngineConfig {
        max_turns: 3,
        ..fast_config()
    };
    let processor = reference_processor(config);
    let id = processor.start_session(spec("US")).await.unwrap();
    processor.generate_opening(&id).await.unwrap();
    for _ in 0..3 {
        processor.process_turn(&id, "hmm").await.unwrap();
    }
    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.outcome(), CallOutcome::MaxTurnsExceeded);
    let transitions = episode.transitions();
    let exit = transitions.last().unwrap();
    assert_eq!(exit.action, Action::ComplianceExit);
    assert!(exit.done);
    for pair in transitions.windows(2) {
        assert_eq!(pair[0].next_state, pair[1].state);
    }
}

// -- Compliance overrides --

#[tokio::test]
async fn attempt_cap_forces_end_call_on_the_opening() {
    let processor = reference_processor(fast_config());
    let id = processor
        .start_session(spec("US").with_prior_attempts(7))
        .await
        .unwrap();
    let output = processor.generate_opening(&id).await.unwrap();
    let trace = &output.trace;
    assert_eq!(trace.proposed_action, Action::Greet);
    assert_eq!(trace.emitted_action, Action::ComplianceExit);
    assert!(trace.overridden);
    assert_eq!(trace.directive, DirectiveMode::Forced);
    assert_eq!(trace.decision.forced_transition, Some(FsmState::EndCall));
    assert_eq!(output.new_state, FsmState::EndCall);
    assert_eq!(trace.call_outcome, Some(CallOutcome::ComplianceStop));
    assert!(trace.reward.terminal < 0.0);
}

#[tokio::test]
async fn forced_transitions_commit_to_exactly_the_forced_state() {
    // outside the calling window
    let processor = reference_processor(fast_config());
    let id = processor
        .start_session(SessionSpec::new("US", debt()).with_id("late").at_minute(22 * 60))
        .await
        .unwrap();
    let late = processor.generate_opening(&id).await.unwrap();
    assert_eq!(late.trace.decision.forced_transition, Some(FsmState::CallbackScheduled));
    assert_eq!(late.new_state, FsmState::CallbackScheduled);
    assert_eq!(late.trace.call_outcome, Some(CallOutcome::Callback));
    let exit = processor.process_turn(&id, "Okay.").await.unwrap();
    assert_eq!(exit.trace.emitted_action, Action::ConfirmCallback);
    assert_eq!(exit.new_state, FsmState::EndCall);
    assert_eq!(exit.trace.reward.terminal, 0.0);

    // do-not-call request mid-verification
    let id = processor.start_session(spec("US")).await.unwrap();
    processor.generate_opening(&id).await.unwrap();
    processor.process_turn(&id, "Hello?").await.unwrap();
    let stop = processor.process_turn(&id, "Stop calling me.").await.unwrap();
    assert_eq!(stop.trace.proposed_action, Action::VerifyIdentity);
    assert_eq!(stop.trace.emitted_action, Action::ComplianceExit);
    assert_eq!(stop.trace.decision.forced_transition, Some(stop.new_state));
    assert_eq!(stop.new_state, FsmState::DoNotCall);
    assert!(stop.agent_utterance.contains("stop contacting you"));
    let exit = processor.process_turn(&id, "Alright.").await.unwrap();
    assert_eq!(exit.new_state, FsmState::EndCall);
    assert_eq!(exit.trace.call_outcome, Some(CallOutcome::DoNotCall));
}

#[tokio::test]
async fn prohibited_phrase_is_blocked_and_regenerated() {
    let generator = Arc::new(ThreateningGenerator {
        inner: TemplateGenerator::new(library()),
        even_when_forced: false,
    });
    let processor = with_generator(fast_config(), generator);
    let id = processor.start_session(spec("UAE")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();
    let trace = &output.trace;

    assert!(!trace.decision.allowed);
    assert!(trace.decision.blocked_reasons.iter().any(|r| r.contains("police")));
    assert_eq!(trace.directive, DirectiveMode::Forced);
    assert!(!output.agent_utterance.to_lowercase().contains("police"));
    assert!(trace.validation.passed);
    assert!(!trace.validation.fallback_used);
    // the action itself was fine, only its wording was not
    assert_eq!(trace.emitted_action, Action::Greet);
    assert_eq!(output.new_state, FsmState::Disclosure);
}

#[tokio::test]
async fn persistent_prohibited_phrase_falls_back_to_canned_script() {
    let generator = Arc::new(ThreateningGenerator {
        inner: TemplateGenerator::new(library()),
        even_when_forced: true,
    });
    let processor = with_generator(fast_config(), generator);
    let id = processor.start_session(spec("UAE")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();

    assert!(output.trace.validation.fallback_used);
    assert!(!output.trace.validation.passed);
    assert!(!output.agent_utterance.to_lowercase().contains("police"));
    assert!(!output.trace.decision.allowed);
}

#[tokio::test]
async fn turn_cap_forces_end_call_with_negative_terminal() {
    let config = EngineConfig {
        max_turns: 4,
        ..fast_config()
    };
    let processor = reference_processor(config);
    let id = processor.start_session(spec("US")).await.unwrap();
    processor.generate_opening(&id).await.unwrap();
    for _ in 0..3 {
        let output = processor.process_turn(&id, "hmm").await.unwrap();
        assert_ne!(output.new_state, FsmState::EndCall);
    }
    let output = processor.process_turn(&id, "hmm").await.unwrap();
    assert_eq!(output.new_state, FsmState::EndCall);
    assert_eq!(output.trace.call_outcome, Some(CallOutcome::MaxTurnsExceeded));
    assert!(output.trace.reward.terminal < 0.0);
    assert!(output.trace.decision.blocked_reasons.iter().any(|r| r.contains("turn limit")));
}

// -- Validation and repair --

#[tokio::test]
async fn failed_validation_is_repaired_within_budget() {
    let generator = Arc::new(ModeRecordingGenerator::new());
    let validator = Arc::new(QueuedValidator::new(vec![tone_failure(true)]));
    let processor = with_validator(fast_config(), generator.clone(), validator);
    let id = processor.start_session(spec("US")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();

    let validation = &output.trace.validation;
    assert!(validation.passed);
    assert!(!validation.fallback_used);
    assert_eq!(validation.attempts, 2);
    assert_eq!(validation.failures.len(), 1);
    assert_eq!(generator.modes(), vec![DirectiveMode::Normal, DirectiveMode::Repair]);
}

#[tokio::test]
async fn exhausted_repairs_fall_back() {
    let generator = Arc::new(ModeRecordingGenerator::new());
    let validator = Arc::new(QueuedValidator::new(vec![
        tone_failure(true),
        tone_failure(true),
        tone_failure(true),
    ]));
    let processor = with_validator(fast_config(), generator.clone(), validator);
    let id = processor.start_session(spec("US")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();

    let validation = &output.trace.validation;
    assert!(!validation.passed);
    assert!(validation.fallback_used);
    assert_eq!(validation.attempts, 3);
    assert_eq!(generator.modes().len(), 3);
    // the fallback still advances the conversation
    assert_eq!(output.new_state, FsmState::Disclosure);
}

#[tokio::test]
async fn unrepairable_failure_falls_back_immediately() {
    let generator = Arc::new(ModeRecordingGenerator::new());
    let validator = Arc::new(QueuedValidator::new(vec![tone_failure(false)]));
    let processor = with_validator(fast_config(), generator.clone(), validator);
    let id = processor.start_session(spec("US")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();

    assert!(output.trace.validation.fallback_used);
    assert_eq!(output.trace.validation.attempts, 1);
    assert_eq!(generator.modes(), vec![DirectiveMode::Normal]);
}

#[tokio::test]
async fn generation_timeout_uses_fallback() {
    let config = EngineConfig {
        generation_timeout_ms: 20,
        ..fast_config()
    };
    let generator = Arc::new(SlowGenerator {
        delay: Duration::from_millis(500),
        inner: TemplateGenerator::new(library()),
    });
    let processor = with_generator(config, generator);
    let id = processor.start_session(spec("US")).await.unwrap();
    let output = processor.generate_opening(&id).await.unwrap();

    assert!(output.trace.validation.timed_out);
    assert!(output.trace.validation.fallback_used);
    assert!(output.agent_utterance.starts_with("Hello"));
    assert_eq!(output.new_state, FsmState::Disclosure);
}

// -- Collaborator failures --

#[tokio::test]
async fn generator_outage_ends_the_session_with_system_error() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let generator = Arc::new(DownGenerator {
        calls: AtomicU32::new(0),
    });
    let processor = with_generator(fast_config(), generator.clone()).with_recorder(recorder.clone());
    let id = processor.start_session(spec("US")).await.unwrap();

    let err = processor.generate_opening(&id).await.unwrap_err();
    assert!(matches!(err, TurnError::GenerationFailure { attempts: 3, .. }));
    assert!(err.is_fatal());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

    let err = processor.process_turn(&id, "Hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::SessionClosed(_)));

    wait_for_records(&recorder, 1).await;
    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.outcome(), CallOutcome::SystemError);
    assert_eq!(episode.len(), 1);
    assert!((episode.total_return() - (-3.0 - 0.05)).abs() < 1e-9);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.len().await, 1);
}

#[tokio::test]
async fn validator_outage_is_fatal() {
    let generator = Arc::new(ModeRecordingGenerator::new());
    let processor = with_validator(fast_config(), generator, Arc::new(DownValidator));
    let id = processor.start_session(spec("US")).await.unwrap();
    let err = processor.generate_opening(&id).await.unwrap_err();
    assert!(matches!(err, TurnError::ValidatorUnavailable { attempts: 3, .. }));
    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.outcome(), CallOutcome::SystemError);
}

// -- Sessions --

#[tokio::test]
async fn session_errors() {
    let processor = reference_processor(fast_config());
    let err = processor
        .start_session(SessionSpec::new("ZZ", debt()))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::UnknownJurisdiction(_)));

    let id = processor.start_session(spec("us")).await.unwrap();
    let err = processor.start_session(spec("US")).await.unwrap_err();
    assert!(matches!(err, TurnError::SessionExists(_)));

    let err = processor.process_turn(&id, "Hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::OpeningNotGenerated(_)));

    processor.generate_opening(&id).await.unwrap();
    let err = processor.generate_opening(&id).await.unwrap_err();
    assert!(matches!(err, TurnError::OpeningAlreadyGenerated(_)));
    assert!(!err.is_fatal());

    let err = processor.process_turn("nope", "Hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::SessionNotFound(_)));
}

#[tokio::test]
async fn generated_session_ids_are_unique() {
    let processor = reference_processor(fast_config());
    let a = processor.start_session(SessionSpec::new("US", debt())).await.unwrap();
    let b = processor.start_session(SessionSpec::new("US", debt())).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(processor.active_sessions().await, 2);
}

#[tokio::test]
async fn processors_created_together_hand_out_disjoint_ids() {
    let first = reference_processor(fast_config());
    let second = reference_processor(fast_config());
    let mut ids = std::collections::HashSet::new();
    for processor in [&first, &second] {
        for _ in 0..3 {
            let id = processor.start_session(SessionSpec::new("US", debt())).await.unwrap();
            assert!(ids.insert(id.clone()), "duplicate id {}", id);
        }
    }
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn ending_mid_call_seals_with_no_resolution() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let processor = reference_processor(fast_config()).with_recorder(recorder.clone());
    let id = processor.start_session(spec("US")).await.unwrap();
    processor.generate_opening(&id).await.unwrap();
    processor.process_turn(&id, "Hello?").await.unwrap();

    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.outcome(), CallOutcome::NoResolution);
    assert_eq!(episode.len(), 2);
    assert!(matches!(
        processor.end_session(&id).await,
        Err(TurnError::SessionNotFound(_))
    ));
    wait_for_records(&recorder, 1).await;
}

#[tokio::test]
async fn flushing_waits_for_pending_recordings() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let processor = reference_processor(fast_config()).with_recorder(recorder.clone());
    for n in 0..3 {
        let id = processor
            .start_session(SessionSpec::new("US", debt()).with_id(format!("s-{}", n)).at_minute(600))
            .await
            .unwrap();
        processor.generate_opening(&id).await.unwrap();
        processor.end_session(&id).await.unwrap();
    }
    processor.flush_recordings().await;
    assert_eq!(recorder.len().await, 3);
}

#[tokio::test]
async fn teardown_waits_for_the_turn_in_flight() {
    let generator = Arc::new(SlowGenerator {
        delay: Duration::from_millis(150),
        inner: TemplateGenerator::new(library()),
    });
    let config = EngineConfig {
        idle_timeout_secs: 0,
        ..fast_config()
    };
    let processor = Arc::new(with_generator(config, generator));
    let id = processor.start_session(spec("US")).await.unwrap();

    let turn = {
        let processor = Arc::clone(&processor);
        let id = id.clone();
        tokio::spawn(async move { processor.generate_opening(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // busy sessions are never reaped
    assert!(processor.reap_idle().await.is_empty());

    // ending waits for COMMIT, so the opening is part of the episode
    let episode = processor.end_session(&id).await.unwrap();
    let output = turn.await.unwrap().unwrap();
    assert_eq!(output.new_state, FsmState::Disclosure);
    assert_eq!(episode.len(), 1);
}

#[tokio::test]
async fn idle_sessions_are_reaped() {
    let config = EngineConfig {
        idle_timeout_secs: 0,
        ..fast_config()
    };
    let recorder = Arc::new(InMemoryRecorder::new());
    let processor = reference_processor(config).with_recorder(recorder.clone());
    let a = processor.start_session(spec("US")).await.unwrap();
    let b = processor
        .start_session(SessionSpec::new("UK", debt()).with_id("s-2").at_minute(600))
        .await
        .unwrap();
    processor.generate_opening(&a).await.unwrap();

    let mut reaped = processor.reap_idle().await;
    reaped.sort();
    assert_eq!(reaped, vec![a.clone(), b]);
    assert_eq!(processor.active_sessions().await, 0);
    assert!(matches!(
        processor.process_turn(&a, "Hello?").await,
        Err(TurnError::SessionNotFound(_))
    ));
    wait_for_records(&recorder, 2).await;
}

#[tokio::test]
async fn turns_read_the_policy_version_current_at_the_time() {
    let policy = untrained_policy();
    let processor = TurnProcessor::new(fast_config(), policy.clone(), Collaborators::reference(library()));
    let id = processor.start_session(spec("US")).await.unwrap();
    let opening = processor.generate_opening(&id).await.unwrap();
    assert_eq!(opening.trace.learner.version, 1);

    policy.swap(ActionSelector::new(&LearnerConfig::default())).await;
    let next = processor.process_turn(&id, "Hello?").await.unwrap();
    assert_eq!(next.trace.learner.version, 2);

    let episode = processor.end_session(&id).await.unwrap();
    assert_eq!(episode.learner().version, 1);
}
