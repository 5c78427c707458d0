//! Deferred resolution of mutually dependent through relations
//!
//! Relations declared through a [`Scheduler`] may reference relations that do
//! not exist yet. Such declarations are queued instead of failing and replayed
//! by [`Scheduler::solve`] until the queue stops shrinking, after which one
//! final pass surfaces the remaining errors.

use std::sync::{Mutex, MutexGuard};

use crate::error::{ThroughError, ThroughResult};
use crate::relationships::{AssociationOptions, RelationDeclaration, RelationKind};

use super::associate::ThroughAssociations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Replaying queued requests, re-queueing those that still fail
    Resolving,
    /// Replaying queued requests with errors surfaced
    Finalizing,
}

/// A relation declaration as the caller made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRequest {
    pub owner: String,
    pub kind: RelationKind,
    pub name: String,
    pub options: AssociationOptions,
}

impl AssociationRequest {
    pub fn new(
        owner: impl Into<String>,
        kind: RelationKind,
        name: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        Self {
            owner: owner.into(),
            kind,
            name: name.into(),
            options,
        }
    }

    fn replay(&self, associations: &ThroughAssociations) -> ThroughResult<RelationDeclaration> {
        associations.associate(&self.owner, self.kind, &self.name, self.options.clone())
    }
}

/// A queued request and the error that deferred it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRequest {
    pub request: AssociationRequest,
    pub error: ThroughError,
}

/// Result of declaring a relation through the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared {
    Constructed(RelationDeclaration),
    /// Queued until the next solve
    Deferred,
}

impl Declared {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }

    pub fn declaration(&self) -> Option<&RelationDeclaration> {
        match self {
            Self::Constructed(declaration) => Some(declaration),
            Self::Deferred => None,
        }
    }

    pub fn into_declaration(self) -> Option<RelationDeclaration> {
        match self {
            Self::Constructed(declaration) => Some(declaration),
            Self::Deferred => None,
        }
    }
}

/// Summary of a successful solve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Replay passes over the queue, including the final one
    pub rounds: usize,
    /// `(owner, name)` of every relation constructed while solving, in order
    pub resolved: Vec<(String, String)>,
}

enum Outcome {
    Constructed(RelationDeclaration),
    Deferred(DeferredRequest),
    Failed(ThroughError),
}

#[derive(Debug, Default)]
struct SchedulerState {
    phase: Phase,
    queue: Vec<DeferredRequest>,
}

/// Queue of declarations waiting for the relations they depend on
#[derive(Debug, Default)]
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declaration helpers for one owner model that defer instead of failing
    pub fn model<'a>(
        &'a self,
        associations: &'a ThroughAssociations,
        name: impl Into<String>,
    ) -> CyclicalScope<'a> {
        CyclicalScope {
            scheduler: self,
            associations,
            model: name.into(),
        }
    }

    /// Declare a relation, queueing it if it depends on undeclared relations
    pub fn associate(
        &self,
        associations: &ThroughAssociations,
        owner: &str,
        kind: RelationKind,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<Declared> {
        let request = AssociationRequest::new(owner, kind, name, options);
        let outcome = attempt(associations, request);
        self.settle(outcome)
    }

    /// Replay queued declarations until no further progress is made
    pub fn solve(&self, associations: &ThroughAssociations) -> ThroughResult<SolveReport> {
        {
            let mut state = self.lock()?;
            if state.phase != Phase::Idle {
                return Err(ThroughError::SolveInProgress);
            }
            state.phase = Phase::Resolving;
        }

        let result = self.run(associations);

        match self.state.lock() {
            Ok(mut state) => state.phase = Phase::Idle,
            Err(poisoned) => poisoned.into_inner().phase = Phase::Idle,
        }

        if let Ok(report) = &result {
            if report.rounds > 0 {
                tracing::info!(
                    "Solved {} deferred relations in {} rounds",
                    report.resolved.len(),
                    report.rounds
                );
            }
        }

        result
    }

    /// Number of queued declarations
    pub fn pending(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.queue.len(),
            Err(poisoned) => poisoned.into_inner().queue.len(),
        }
    }

    /// Snapshot of the queued declarations, oldest first
    pub fn deferred(&self) -> Vec<DeferredRequest> {
        match self.state.lock() {
            Ok(state) => state.queue.clone(),
            Err(poisoned) => poisoned.into_inner().queue.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state.lock() {
            Ok(state) => state.phase,
            Err(poisoned) => poisoned.into_inner().phase,
        }
    }

    fn lock(&self) -> ThroughResult<MutexGuard<'_, SchedulerState>> {
        self.state.lock().map_err(|_| ThroughError::lock("scheduler"))
    }

    /// Apply an outcome; the finalizing check and the enqueue happen under one lock
    fn settle(&self, outcome: Outcome) -> ThroughResult<Declared> {
        match outcome {
            Outcome::Constructed(declaration) => Ok(Declared::Constructed(declaration)),
            Outcome::Failed(err) => Err(err),
            Outcome::Deferred(deferred) => {
                let mut state = self.lock()?;
                if state.phase == Phase::Finalizing {
                    return Err(deferred.error);
                }
                tracing::debug!(
                    "Deferring {}.{}: {}",
                    deferred.request.owner,
                    deferred.request.name,
                    deferred.error
                );
                state.queue.push(deferred);
                Ok(Declared::Deferred)
            }
        }
    }

    fn run(&self, associations: &ThroughAssociations) -> ThroughResult<SolveReport> {
        let mut report = SolveReport::default();
        let mut previous: Option<usize> = None;

        loop {
            let batch = {
                let mut state = self.lock()?;
                let length = state.queue.len();
                if length == 0 || previous.is_some_and(|previous| length >= previous) {
                    break;
                }
                previous = Some(length);
                std::mem::take(&mut state.queue)
            };

            report.rounds += 1;
            tracing::debug!("Solving round {} with {} pending", report.rounds, batch.len());
            self.replay_round(associations, batch, &mut report)?;
        }

        let remaining = {
            let mut state = self.lock()?;
            if state.queue.is_empty() {
                return Ok(report);
            }
            state.phase = Phase::Finalizing;
            std::mem::take(&mut state.queue)
        };

        report.rounds += 1;
        self.finalize(associations, remaining, &mut report)?;
        Ok(report)
    }

    fn replay_round(
        &self,
        associations: &ThroughAssociations,
        batch: Vec<DeferredRequest>,
        report: &mut SolveReport,
    ) -> ThroughResult<()> {
        let mut batch = batch.into_iter();
        while let Some(deferred) = batch.next() {
            match attempt(associations, deferred.request) {
                Outcome::Constructed(declaration) => {
                    tracing::debug!("Resolved {}.{}", declaration.owner, declaration.name);
                    report.resolved.push((declaration.owner, declaration.name));
                }
                outcome => {
                    if let Err(err) = self.settle(outcome) {
                        self.requeue(batch)?;
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn finalize(
        &self,
        associations: &ThroughAssociations,
        remaining: Vec<DeferredRequest>,
        report: &mut SolveReport,
    ) -> ThroughResult<()> {
        let mut remaining = remaining.into_iter();
        while let Some(deferred) = remaining.next() {
            match deferred.request.replay(associations) {
                Ok(declaration) => {
                    report.resolved.push((declaration.owner, declaration.name));
                }
                Err(err) => {
                    tracing::warn!(
                        "Could not resolve {}.{}: {}",
                        deferred.request.owner,
                        deferred.request.name,
                        err
                    );
                    let failed = err.is_deferrable().then(|| DeferredRequest {
                        request: deferred.request,
                        error: err.clone(),
                    });
                    self.requeue(failed.into_iter().chain(remaining))?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn requeue(&self, requests: impl IntoIterator<Item = DeferredRequest>) -> ThroughResult<()> {
        self.lock()?.queue.extend(requests);
        Ok(())
    }
}

fn attempt(associations: &ThroughAssociations, request: AssociationRequest) -> Outcome {
    match request.replay(associations) {
        Ok(declaration) => Outcome::Constructed(declaration),
        Err(error) if error.is_deferrable() => {
            Outcome::Deferred(DeferredRequest { request, error })
        }
        Err(error) => Outcome::Failed(error),
    }
}

/// Declaration helpers for a single owner model, deferring unresolved paths
#[derive(Debug, Clone)]
pub struct CyclicalScope<'a> {
    scheduler: &'a Scheduler,
    associations: &'a ThroughAssociations,
    model: String,
}

impl CyclicalScope<'_> {
    pub fn name(&self) -> &str {
        &self.model
    }

    pub fn one_to_many(&self, name: &str, options: AssociationOptions) -> ThroughResult<Declared> {
        self.declare(RelationKind::OneToMany, name, options)
    }

    pub fn many_to_one(&self, name: &str, options: AssociationOptions) -> ThroughResult<Declared> {
        self.declare(RelationKind::ManyToOne, name, options)
    }

    pub fn one_to_one(&self, name: &str, options: AssociationOptions) -> ThroughResult<Declared> {
        self.declare(RelationKind::OneToOne, name, options)
    }

    pub fn many_to_many(&self, name: &str, options: AssociationOptions) -> ThroughResult<Declared> {
        self.declare(RelationKind::ManyToMany, name, options)
    }

    fn declare(
        &self,
        kind: RelationKind,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<Declared> {
        self.scheduler
            .associate(self.associations, &self.model, kind, name, options)
    }
}
