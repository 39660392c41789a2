//! The turn processor.
//!
//! One turn walks AWAIT_INPUT → SELECT_ACTION → POLICY_CHECK → GENERATE →
//! VALIDATE → SCORE → COMMIT while holding the session's mutex, so turns
//! within a session are strictly sequential and teardown waits for COMMIT.
//! Sessions are independent apart from the shared [`PolicyHandle`], which
//! each turn reads once.

mod session;

pub use session::SessionSpec;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use settle_core::{
    Action, CallOutcome, ConversationContext, Directive, DirectiveMode, Episode, EpisodeBuilder, FsmState,
    JurisdictionRules, LatencyBreakdown, LearnerTag, OutcomeSignal, PolicyDecision, PolicyGuard, RewardComputer,
    RewardConfig, StateMachine, TraceBuilder, Transition, TransitionInfo, TurnTrace, ValidationOutcome,
};
use settle_storage::EpisodeRecorder;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::collaborators::{CollaboratorError, Collaborators, TemplateLibrary, ValidationReport};
use crate::config::{EngineConfig, SettleConfig};
use crate::error::TurnError;
use crate::policy::{ActionSelector, PolicyHandle, Selection};
use session::{local_minute_of_day, now_rfc3339, Session};

/// Stage of a single turn, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitInput,
    SelectAction,
    PolicyCheck,
    Generate,
    Validate,
    Score,
    Commit,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::AwaitInput => "AWAIT_INPUT",
            TurnPhase::SelectAction => "SELECT_ACTION",
            TurnPhase::PolicyCheck => "POLICY_CHECK",
            TurnPhase::Generate => "GENERATE",
            TurnPhase::Validate => "VALIDATE",
            TurnPhase::Score => "SCORE",
            TurnPhase::Commit => "COMMIT",
        };
        f.write_str(name)
    }
}

/// What a turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutput {
    pub agent_utterance: String,
    pub trace: TurnTrace,
    pub new_state: FsmState,
}

#[derive(Debug)]
struct Exploration {
    epsilon: f64,
    rng: StdRng,
}

/// The utterance that will be spoken, and how it was arrived at.
struct Realized {
    text: String,
    mode: DirectiveMode,
    validation: ValidationOutcome,
    generate_time: Duration,
    validate_time: Duration,
}

/// Why a collaborator call did not return a value.
enum CallFailure {
    TimedOut,
    Exhausted { attempts: u32, source: CollaboratorError },
}

pub struct TurnProcessor {
    config: EngineConfig,
    fsm: StateMachine,
    rewards: RewardComputer,
    jurisdictions: BTreeMap<String, JurisdictionRules>,
    policy: Arc<PolicyHandle>,
    collaborators: Collaborators,
    templates: Arc<TemplateLibrary>,
    recorder: Option<Arc<dyn EpisodeRecorder>>,
    /// Recording tasks not yet joined.
    recordings: StdMutex<JoinSet<()>>,
    exploration: Option<Mutex<Exploration>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    run_tag: String,
    next_id: AtomicU64,
}

impl fmt::Debug for TurnProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnProcessor")
            .field("config", &self.config)
            .field("jurisdictions", &self.jurisdictions.keys().collect::<Vec<_>>())
            .field("recorder", &self.recorder.is_some())
            .field("exploring", &self.exploration.is_some())
            .finish_non_exhaustive()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

fn phase(session: &str, phase: TurnPhase) {
    debug!(session = %session, phase = %phase, "turn phase");
}

/// Per-processor id prefix: creation time in nanoseconds plus random bits,
/// so processes started together still hand out disjoint ids.
fn run_tag() -> String {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{:x}{:08x}", nanos & i128::from(u64::MAX), rand::random::<u32>())
}

impl TurnProcessor {
    /// A processor with built-in jurisdictions, default rewards and the
    /// built-in template library.
    pub fn new(config: EngineConfig, policy: Arc<PolicyHandle>, collaborators: Collaborators) -> Self {
        Self {
            config,
            fsm: StateMachine::new(),
            rewards: RewardComputer::default(),
            jurisdictions: settle_core::builtin_jurisdictions(),
            policy,
            collaborators,
            templates: Arc::new(TemplateLibrary::builtin()),
            recorder: None,
            recordings: StdMutex::new(JoinSet::new()),
            exploration: None,
            sessions: RwLock::new(HashMap::new()),
            run_tag: run_tag(),
            next_id: AtomicU64::new(1),
        }
    }

    /// A fully configured processor with the reference collaborators.
    pub fn reference(config: &SettleConfig, policy: Arc<PolicyHandle>) -> Self {
        let templates = Arc::new(TemplateLibrary::with_overrides(&config.templates));
        Self::new(config.engine.clone(), policy, Collaborators::reference(templates.clone()))
            .with_rewards(config.reward.clone())
            .with_jurisdictions(config.all_jurisdictions())
            .with_templates(templates)
    }

    pub fn with_rewards(mut self, rewards: RewardConfig) -> Self {
        self.rewards = RewardComputer::new(rewards);
        self
    }

    /// Replace the jurisdiction table. Keys are matched case-insensitively.
    pub fn with_jurisdictions(mut self, jurisdictions: BTreeMap<String, JurisdictionRules>) -> Self {
        self.jurisdictions = jurisdictions
            .into_iter()
            .map(|(code, rules)| (code.to_ascii_uppercase(), rules))
            .collect();
        self
    }

    /// Library used for fallback utterances.
    pub fn with_templates(mut self, templates: Arc<TemplateLibrary>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EpisodeRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Epsilon-greedy selection with a seeded generator. Training only.
    pub fn with_exploration(mut self, epsilon: f64, seed: u64) -> Self {
        self.exploration = Some(Mutex::new(Exploration {
            epsilon,
            rng: StdRng::seed_from_u64(seed),
        }));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<PolicyHandle> {
        &self.policy
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Open a session at OPENING. Returns its id.
    pub async fn start_session(&self, spec: SessionSpec) -> Result<String, TurnError> {
        let code = spec.jurisdiction.to_ascii_uppercase();
        let rules = self
            .jurisdictions
            .get(&code)
            .cloned()
            .ok_or_else(|| TurnError::UnknownJurisdiction(spec.jurisdiction.clone()))?;

        let id = spec.session_id.clone().unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            format!("{}-{:06}", self.run_tag, n)
        });
        let minute = spec
            .local_minute_of_day
            .unwrap_or_else(|| local_minute_of_day(rules.utc_offset_minutes));
        let context = ConversationContext::new(&spec.debt, spec.prior_attempts, minute);

        let current = self.policy.current().await;
        let learner = LearnerTag {
            kind: current.selector.kind(),
            version: current.version,
        };
        let episode = EpisodeBuilder::new(
            format!("ep-{}", id),
            id.clone(),
            code.clone(),
            spec.persona.clone(),
            learner,
            now_rfc3339(),
        );
        let session = Session::new(id.clone(), PolicyGuard::new(rules), context, episode);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(TurnError::SessionExists(id));
        }
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(
            session = %id,
            jurisdiction = %code,
            minute_of_day = minute,
            persona = spec.persona.as_deref().unwrap_or("-"),
            "session started"
        );
        Ok(id)
    }

    async fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, TurnError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TurnError::SessionNotFound(id.to_string()))
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// The committed context. Waits for an in-flight turn.
    pub async fn context(&self, id: &str) -> Result<ConversationContext, TurnError> {
        let session = self.session(id).await?;
        let s = session.lock().await;
        Ok(s.context.clone())
    }

    /// Every sealed trace of the session, oldest first.
    pub async fn session_traces(&self, id: &str) -> Result<Vec<TurnTrace>, TurnError> {
        let session = self.session(id).await?;
        let s = session.lock().await;
        Ok(s.traces.clone())
    }

    /// End a session and return its sealed episode.
    ///
    /// Waits for an in-flight turn to commit. A session still mid-call is
    /// sealed with the outcome it has so far, or no resolution.
    pub async fn end_session(&self, id: &str) -> Result<Episode, TurnError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| TurnError::SessionNotFound(id.to_string()))?;
        let mut s = session.lock().await;
        self.seal_open_episode(&mut s);
        info!(session = %id, "session ended");
        s.sealed
            .take()
            .ok_or_else(|| TurnError::SessionClosed(id.to_string()))
    }

    /// Wait until every sealed episode handed to the recorder has been
    /// written. Turns never wait on the recorder; call this before shutdown.
    pub async fn flush_recordings(&self) {
        let mut pending = match self.recordings.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "recording task failed");
            }
        }
    }

    /// End every session idle for longer than the configured timeout.
    /// Sessions with a turn in flight are skipped. Returns the reaped ids.
    pub async fn reap_idle(&self) -> Vec<String> {
        let timeout = self.config.idle_timeout();
        let candidates: Vec<(String, Arc<Mutex<Session>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect();

        let mut reaped = Vec::new();
        for (id, session) in candidates {
            let Ok(mut s) = session.try_lock() else {
                debug!(session = %id, "turn in flight; not reaping");
                continue;
            };
            if s.last_active.elapsed() < timeout {
                continue;
            }
            self.seal_open_episode(&mut s);
            self.sessions.write().await.remove(&id);
            info!(session = %id, "idle session reaped");
            reaped.push(id);
        }
        reaped
    }

    fn seal_open_episode(&self, s: &mut Session) {
        if let Some(builder) = &s.episode {
            let outcome = builder.current_outcome().unwrap_or(CallOutcome::NoResolution);
            self.finish_episode(s, outcome);
        }
    }

    /// Seal the episode, hand it to the recorder without waiting, and
    /// close the session. A no-op once sealed.
    fn finish_episode(&self, s: &mut Session, outcome: CallOutcome) {
        let Some(builder) = s.episode.take() else {
            return;
        };
        let episode = builder.seal(outcome, now_rfc3339());
        info!(
            session = %s.id,
            outcome = %outcome,
            turns = episode.len(),
            total_return = episode.total_return(),
            "episode sealed"
        );
        if let Some(recorder) = &self.recorder {
            let recorder = Arc::clone(recorder);
            let copy = episode.clone();
            let task = async move {
                if let Err(err) = recorder.record(&copy).await {
                    warn!(episode = %copy.episode_id(), error = %err, "episode not recorded");
                }
            };
            match self.recordings.lock() {
                Ok(mut pending) => {
                    while pending.try_join_next().is_some() {}
                    pending.spawn(task);
                }
                Err(_) => {
                    tokio::spawn(task);
                }
            }
        }
        s.sealed = Some(episode);
        s.closed = true;
    }

    /// Close the session after a fatal turn error.
    fn abort(&self, s: &mut Session, outcome: CallOutcome) {
        if s.episode.is_none() {
            s.closed = true;
            return;
        }
        let action = Action::ComplianceExit;
        let mut next = s.context.committed(action, FsmState::EndCall);
        next.call_outcome = Some(outcome);
        let reward = self
            .rewards
            .compute(&s.context, action, &next, OutcomeSignal::None);
        let transition = Transition {
            state: s.context.clone(),
            action,
            reward: reward.total,
            next_state: next.clone(),
            done: true,
            info: TransitionInfo {
                turn_index: s.context.turn_count,
                signal: OutcomeSignal::None,
                proposed_action: action,
                overridden: false,
                fallback_used: false,
                reward,
            },
        };
        if let Some(builder) = s.episode.as_mut() {
            builder.push(transition);
        }
        s.context = next;
        self.finish_episode(s, outcome);
    }

    // ── Turns ────────────────────────────────────────────────────────

    /// The agent's first utterance. Allowed once per session.
    pub async fn generate_opening(&self, id: &str) -> Result<TurnOutput, TurnError> {
        let session = self.session(id).await?;
        let mut s = session.lock().await;
        if s.closed {
            return Err(TurnError::SessionClosed(id.to_string()));
        }
        if s.opening_done {
            return Err(TurnError::OpeningAlreadyGenerated(id.to_string()));
        }
        self.run_turn(&mut s, None).await
    }

    /// Process one borrower utterance and produce the agent's reply.
    pub async fn process_turn(&self, id: &str, utterance: &str) -> Result<TurnOutput, TurnError> {
        let session = self.session(id).await?;
        let mut s = session.lock().await;
        if s.closed {
            return Err(TurnError::SessionClosed(id.to_string()));
        }
        if !s.opening_done {
            return Err(TurnError::OpeningNotGenerated(id.to_string()));
        }
        self.run_turn(&mut s, Some(utterance)).await
    }

    async fn run_turn(&self, s: &mut Session, utterance: Option<&str>) -> Result<TurnOutput, TurnError> {
        match self.execute(s, utterance).await {
            Ok(output) => Ok(output),
            Err(err) => {
                if err.is_fatal() {
                    error!(session = %s.id, error = %err, "turn failed; ending session");
                    self.abort(s, CallOutcome::SystemError);
                }
                Err(err)
            }
        }
    }

    async fn select(
        &self,
        selector: &ActionSelector,
        ctx: &ConversationContext,
        legal: &[Action],
    ) -> Option<Selection> {
        match &self.exploration {
            Some(exploration) => {
                let mut guard = exploration.lock().await;
                let Exploration { epsilon, rng } = &mut *guard;
                selector.select_exploring(ctx, legal, *epsilon, rng)
            }
            None => selector.select(ctx, legal),
        }
    }

    async fn execute(&self, s: &mut Session, utterance: Option<&str>) -> Result<TurnOutput, TurnError> {
        let started = Instant::now();
        let mut latency = LatencyBreakdown::default();
        let prev = s.context.clone();
        let turn_index = prev.turn_count;
        let mut trace = TraceBuilder::new(s.id.clone(), turn_index, prev.fsm_state);

        phase(&s.id, TurnPhase::AwaitInput);
        let mut observed = prev.clone();
        let signal = match utterance {
            Some(text) => {
                let observation = self.collaborators.classifier.classify(text, &prev);
                observed.observe(&observation);
                trace.input(text, observation.signal);
                observation.signal
            }
            None => OutcomeSignal::None,
        };

        phase(&s.id, TurnPhase::SelectAction);
        let state = observed.fsm_state;
        let legal = self.fsm.legal_actions(state);
        let policy = self.policy.current().await;
        let selection = self
            .select(&policy.selector, &observed, legal)
            .await
            .ok_or(TurnError::NoLegalActions(state))?;
        latency.select_us = micros(selection.latency);
        let proposed = selection.action;
        trace.selection(
            proposed,
            LearnerTag {
                kind: policy.selector.kind(),
                version: policy.version,
            },
        );

        phase(&s.id, TurnPhase::PolicyCheck);
        let policy_started = Instant::now();
        let mut decision = s.guard.evaluate(&observed, proposed, None);
        let mut turn_limit = false;
        if decision.forced_transition.is_none()
            && observed.turn_count >= self.config.max_turns
            && !observed.is_concluded()
        {
            turn_limit = true;
            decision.allowed = false;
            decision.forced_transition = Some(FsmState::EndCall);
            decision
                .blocked_reasons
                .push(format!("turn limit of {} reached", self.config.max_turns));
        }
        let (emitted, directive) = match decision.forced_transition {
            Some(target) => {
                warn!(
                    session = %s.id,
                    proposed = %proposed,
                    target = %target,
                    reasons = ?decision.blocked_reasons,
                    "compliance override"
                );
                (
                    Action::ComplianceExit,
                    Directive::forced(
                        decision.blocked_reasons.clone(),
                        Some(target),
                        decision.required_templates.clone(),
                    ),
                )
            }
            None => (proposed, Directive::normal(decision.required_templates.clone())),
        };
        latency.policy_us = micros(policy_started.elapsed());

        let realized = self
            .realize(s, &observed, emitted, directive, &mut decision)
            .await?;
        latency.generate_us = micros(realized.generate_time);
        latency.validate_us = micros(realized.validate_time);

        phase(&s.id, TurnPhase::Score);
        let next_state = match decision.forced_transition {
            Some(target) => target,
            None => self.fsm.transition(state, emitted, signal)?,
        };
        let mut next = observed.committed(emitted, next_state);
        if next.call_outcome.is_none() {
            next.call_outcome = outcome_for(&decision, turn_limit, &next, signal);
        }
        let reward = self.rewards.compute(&prev, emitted, &next, signal);
        let done = self.fsm.is_terminal(next.fsm_state);

        phase(&s.id, TurnPhase::Commit);
        latency.total_us = micros(started.elapsed());
        trace
            .policy(decision, emitted, realized.mode)
            .utterance(realized.text.clone(), realized.validation.clone())
            .reward(reward)
            .commit(next.fsm_state, next.call_outcome)
            .latency(latency)
            .recorded_at(now_rfc3339());
        let sealed = trace.seal()?;

        let transition = Transition {
            state: observed,
            action: emitted,
            reward: reward.total,
            next_state: next.clone(),
            done,
            info: TransitionInfo {
                turn_index,
                signal,
                proposed_action: proposed,
                overridden: proposed != emitted,
                fallback_used: realized.validation.fallback_used,
                reward,
            },
        };
        if let Some(builder) = s.episode.as_mut() {
            builder.push(transition);
        }
        s.context = next;
        s.traces.push(sealed.clone());
        s.opening_done = true;
        s.last_active = Instant::now();
        debug!(
            session = %s.id,
            turn = turn_index,
            from = %prev.fsm_state,
            to = %sealed.state_after,
            action = %emitted,
            reward = reward.total,
            "turn committed"
        );

        if done {
            let outcome = s.context.call_outcome.unwrap_or(CallOutcome::NoResolution);
            self.finish_episode(s, outcome);
        }

        Ok(TurnOutput {
            agent_utterance: realized.text,
            new_state: sealed.state_after,
            trace: sealed,
        })
    }

    // ── GENERATE / VALIDATE ──────────────────────────────────────────

    /// Produce the utterance for `action`: generate, screen against the
    /// jurisdiction's phrases, validate, repair within budget, and fall
    /// back to the canned script when anything gives up.
    async fn realize(
        &self,
        s: &Session,
        ctx: &ConversationContext,
        action: Action,
        mut directive: Directive,
        decision: &mut PolicyDecision,
    ) -> Result<Realized, TurnError> {
        let mut validation = ValidationOutcome::default();
        let mut generate_time = Duration::ZERO;
        let mut validate_time = Duration::ZERO;
        let mut repairs = 0;

        phase(&s.id, TurnPhase::Generate);
        let mut text = match self.generate(ctx, action, &directive, &mut generate_time).await? {
            Some(text) => text,
            None => {
                validation.timed_out = true;
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            }
        };

        if !screen(&s.guard, ctx, action, &text, decision) {
            if directive.is_forced() {
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            }
            warn!(session = %s.id, action = %action, "prohibited phrase in candidate; regenerating");
            directive = Directive::forced(
                decision.blocked_reasons.clone(),
                None,
                directive.required_templates.clone(),
            );
            text = match self.generate(ctx, action, &directive, &mut generate_time).await? {
                Some(text) => text,
                None => {
                    validation.timed_out = true;
                    return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
                }
            };
            if !screen(&s.guard, ctx, action, &text, decision) {
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            }
        }

        loop {
            phase(&s.id, TurnPhase::Validate);
            let Some(report) = self
                .validate(&text, ctx, action, &directive, &mut validate_time)
                .await?
            else {
                validation.timed_out = true;
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            };
            validation.attempts += 1;
            validation.failures.extend(report.failures.iter().cloned());
            if report.passed {
                validation.passed = true;
                return Ok(Realized {
                    text,
                    mode: directive.mode,
                    validation,
                    generate_time,
                    validate_time,
                });
            }
            if !report.repairable || repairs >= self.config.max_repair_attempts {
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            }

            repairs += 1;
            warn!(
                session = %s.id,
                action = %action,
                repair = repairs,
                failures = report.failures.len(),
                "validation failed; repairing"
            );
            directive = match directive.mode {
                DirectiveMode::Forced => Directive {
                    failures: report.failures,
                    ..directive
                },
                DirectiveMode::Normal | DirectiveMode::Repair => {
                    Directive::repair(report.failures, directive.required_templates)
                }
            };

            phase(&s.id, TurnPhase::Generate);
            text = match self.generate(ctx, action, &directive, &mut generate_time).await? {
                Some(text) => text,
                None => {
                    validation.timed_out = true;
                    return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
                }
            };
            if !screen(&s.guard, ctx, action, &text, decision) {
                return Ok(self.fallback(s, action, &directive, validation, generate_time, validate_time));
            }
        }
    }

    fn fallback(
        &self,
        s: &Session,
        action: Action,
        directive: &Directive,
        mut validation: ValidationOutcome,
        generate_time: Duration,
        validate_time: Duration,
    ) -> Realized {
        warn!(session = %s.id, action = %action, "using fallback utterance");
        validation.passed = false;
        validation.fallback_used = true;
        Realized {
            text: self.templates.fallback(action, directive),
            mode: directive.mode,
            validation,
            generate_time,
            validate_time,
        }
    }

    async fn generate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
        spent: &mut Duration,
    ) -> Result<Option<String>, TurnError> {
        let generator = &self.collaborators.generator;
        let timeout = self.config.generation_timeout();
        match self
            .call_with_retries("generator", timeout, spent, move || generator.generate(ctx, action, directive))
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err(CallFailure::TimedOut) => Ok(None),
            Err(CallFailure::Exhausted { attempts, source }) => {
                Err(TurnError::GenerationFailure { attempts, source })
            }
        }
    }

    async fn validate(
        &self,
        text: &str,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
        spent: &mut Duration,
    ) -> Result<Option<ValidationReport>, TurnError> {
        let validator = &self.collaborators.validator;
        let timeout = self.config.validation_timeout();
        match self
            .call_with_retries("validator", timeout, spent, move || validator.check(text, ctx, action, directive))
            .await
        {
            Ok(report) => Ok(Some(report)),
            Err(CallFailure::TimedOut) => Ok(None),
            Err(CallFailure::Exhausted { attempts, source }) => {
                Err(TurnError::ValidatorUnavailable { attempts, source })
            }
        }
    }

    /// Await `call` under `timeout`, retrying errors with linear backoff.
    /// A timeout is not retried.
    async fn call_with_retries<T, F, Fut>(
        &self,
        collaborator: &'static str,
        timeout: Duration,
        spent: &mut Duration,
        mut call: F,
    ) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, call()).await;
            *spent += started.elapsed();
            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(source)) => {
                    if attempts > self.config.max_external_retries {
                        return Err(CallFailure::Exhausted { attempts, source });
                    }
                    warn!(collaborator, attempt = attempts, error = %source, "collaborator call failed; retrying");
                    tokio::time::sleep(self.config.retry_backoff(attempts)).await;
                }
                Err(_) => {
                    warn!(collaborator, timeout_ms = micros(timeout) / 1000, "collaborator call timed out");
                    return Err(CallFailure::TimedOut);
                }
            }
        }
    }
}

/// Check a candidate against the jurisdiction's prohibited phrases, adding
/// any new reasons to `decision`. True when the candidate is clean.
fn screen(
    guard: &PolicyGuard,
    ctx: &ConversationContext,
    action: Action,
    text: &str,
    decision: &mut PolicyDecision,
) -> bool {
    if guard.prohibited_hits(text).is_empty() {
        return true;
    }
    let screened = guard.evaluate(ctx, action, Some(text));
    decision.allowed = false;
    for reason in screened.blocked_reasons {
        if !decision.blocked_reasons.contains(&reason) {
            decision.blocked_reasons.push(reason);
        }
    }
    false
}

/// Outcome implied by a commit that does not carry one yet.
fn outcome_for(
    decision: &PolicyDecision,
    turn_limit: bool,
    next: &ConversationContext,
    signal: OutcomeSignal,
) -> Option<CallOutcome> {
    let state = next.fsm_state;
    if decision.forced_transition.is_some() {
        return match state {
            FsmState::EndCall if turn_limit => Some(CallOutcome::MaxTurnsExceeded),
            FsmState::EndCall => Some(CallOutcome::ComplianceStop),
            other => CallOutcome::for_branch(other),
        };
    }
    if let Some(outcome) = CallOutcome::for_branch(state) {
        return Some(outcome);
    }
    if state == FsmState::EndCall {
        return Some(if next.payment_arranged {
            CallOutcome::PaymentArrangement
        } else if signal == OutcomeSignal::Hangup {
            CallOutcome::Hangup
        } else {
            CallOutcome::NoResolution
        });
    }
    None
}
