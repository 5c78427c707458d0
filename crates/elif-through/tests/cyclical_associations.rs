use std::sync::{Arc, Mutex};

use elif_through::{
    AssociationOptions, Declared, DefaultInflector, Inflector, Phase, RegistryConstructor,
    RelationConstructor, RelationDeclaration, RelationKind, RelationshipRegistry, Scheduler,
    SolveReport, ThroughAssociations, ThroughError, ThroughResult,
};

fn define(associations: &ThroughAssociations, models: &[&str]) {
    for model in models {
        associations.define_model(model).unwrap();
    }
}

type Declaration = (&'static str, RelationKind, &'static str, Option<&'static str>);

/// Relations of the users/security groups/privileges schema, dependencies last
const DECLARATIONS: [Declaration; 10] = [
    ("User", RelationKind::OneToMany, "user_has_security_groups", None),
    ("SecurityGroup", RelationKind::OneToMany, "security_group_has_privileges", None),
    ("UserHasSecurityGroup", RelationKind::ManyToOne, "user", None),
    ("UserHasSecurityGroup", RelationKind::ManyToOne, "security_group", None),
    ("SecurityGroupHasPrivilege", RelationKind::ManyToOne, "security_group", None),
    ("SecurityGroupHasPrivilege", RelationKind::ManyToOne, "privilege", None),
    ("User", RelationKind::OneToMany, "security_groups", Some("user_has_security_groups")),
    ("SecurityGroup", RelationKind::OneToMany, "privileges", Some("security_group_has_privileges")),
    ("UserHasSecurityGroup", RelationKind::OneToMany, "privileges", Some("security_group")),
    ("User", RelationKind::OneToMany, "privileges", Some("security_groups")),
];

fn security_schema() -> ThroughAssociations {
    let associations = ThroughAssociations::default();
    define(
        &associations,
        &[
            "User",
            "SecurityGroup",
            "Privilege",
            "UserHasSecurityGroup",
            "SecurityGroupHasPrivilege",
        ],
    );
    associations
}

fn declare_all<'a>(
    scheduler: &Scheduler,
    associations: &ThroughAssociations,
    declarations: impl Iterator<Item = &'a Declaration>,
) -> usize {
    let mut deferred = 0;
    for (owner, kind, name, through) in declarations {
        let options = match through {
            Some(through) => AssociationOptions::through(*through),
            None => AssociationOptions::new(),
        };
        if scheduler
            .associate(associations, owner, *kind, name, options)
            .unwrap()
            .is_deferred()
        {
            deferred += 1;
        }
    }
    deferred
}

#[test]
fn test_declaration_order_does_not_change_result() {
    let forward = security_schema();
    let scheduler = Scheduler::new();
    assert_eq!(declare_all(&scheduler, &forward, DECLARATIONS.iter()), 0);
    assert_eq!(scheduler.solve(&forward).unwrap(), SolveReport::default());

    let reversed = security_schema();
    let scheduler = Scheduler::new();
    let deferred = declare_all(&scheduler, &reversed, DECLARATIONS.iter().rev());
    assert_eq!(deferred, 4);

    let report = scheduler.solve(&reversed).unwrap();
    assert_eq!(report.resolved.len(), deferred);
    assert!(report.rounds <= deferred + 1);
    assert_eq!(scheduler.pending(), 0);

    assert_eq!(
        forward.registry().export_json().unwrap(),
        reversed.registry().export_json().unwrap()
    );
}

#[test]
fn test_dependent_requests_resolve_over_several_rounds() {
    let associations = security_schema();
    let scheduler = Scheduler::new();

    // Derived relations first, each depending on the one declared after it
    declare_all(&scheduler, &associations, DECLARATIONS[6..].iter().rev());
    assert_eq!(scheduler.pending(), 4);

    declare_all(&scheduler, &associations, DECLARATIONS[..6].iter());
    let report = scheduler.solve(&associations).unwrap();

    assert!(report.rounds >= 2);
    assert!(report.rounds <= 5);
    assert_eq!(
        report.resolved.last(),
        Some(&("User".to_string(), "privileges".to_string()))
    );
    assert_eq!(
        associations
            .registry()
            .get("User", "privileges")
            .and_then(|declaration| declaration.path)
            .map(|path| path.hops.len()),
        Some(3)
    );
}

#[test]
fn test_missing_association_is_queued_then_raised() {
    let associations = ThroughAssociations::default();
    define(&associations, &["User", "UserHasGroup", "Group"]);
    let scheduler = Scheduler::new();
    let users = scheduler.model(&associations, "User");

    assert!(!users
        .one_to_many("user_has_groups", AssociationOptions::new())
        .unwrap()
        .is_deferred());
    assert!(users
        .many_to_many("groups", AssociationOptions::through("user_has_groups"))
        .unwrap()
        .is_deferred());

    let err = scheduler.solve(&associations).unwrap_err();
    match &err {
        ThroughError::MissingAssociation { association, path, .. } => {
            assert_eq!(association, "groups");
            assert_eq!(path, &vec!["User.user_has_groups", "UserHasGroup.groups"]);
        }
        other => panic!("Expected MissingAssociation, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "User.groups could not be resolved through path User.user_has_groups -> UserHasGroup.groups"
    );
    assert!(!associations.registry().has_relationship("User", "groups"));
    assert_eq!(scheduler.pending(), 1);

    let links = scheduler.model(&associations, "UserHasGroup");
    links.many_to_one("user", AssociationOptions::new()).unwrap();
    links.many_to_one("group", AssociationOptions::new()).unwrap();

    scheduler.solve(&associations).unwrap();
    let groups = associations.registry().get("User", "groups").unwrap();
    assert_eq!(groups.kind, RelationKind::ManyThroughMany);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_final_pass_keeps_unreplayed_requests() {
    let associations = ThroughAssociations::default();
    define(&associations, &["User", "Group", "Role"]);
    let scheduler = Scheduler::new();
    let users = scheduler.model(&associations, "User");

    users
        .one_to_many("groups", AssociationOptions::through("memberships"))
        .unwrap();
    users
        .one_to_many("roles", AssociationOptions::through("assignments"))
        .unwrap();

    let err = scheduler.solve(&associations).unwrap_err();
    assert!(err.to_string().contains(":memberships"));

    let names: Vec<String> = scheduler
        .deferred()
        .into_iter()
        .map(|deferred| deferred.request.name)
        .collect();
    assert_eq!(names, vec!["groups", "roles"]);
    assert_eq!(scheduler.phase(), Phase::Idle);
}

#[test]
fn test_concurrent_declarations() {
    let associations = ThroughAssociations::default();
    define(&associations, &["User", "Group"]);
    let scheduler = Scheduler::new();

    std::thread::scope(|scope| {
        for index in 0..8 {
            let associations = &associations;
            let scheduler = &scheduler;
            scope.spawn(move || {
                let declared = scheduler
                    .model(associations, "User")
                    .one_to_many(
                        &format!("groups_{}", index),
                        AssociationOptions::through(format!("memberships_{}", index)),
                    )
                    .unwrap();
                assert!(declared.is_deferred());
            });
        }
    });

    assert_eq!(scheduler.pending(), 8);
    assert!(scheduler.solve(&associations).is_err());
    assert_eq!(scheduler.pending(), 8);
}

/// Tries to start a nested solve while constructing relations
struct NestedSolve {
    scheduler: Arc<Scheduler>,
    results: Mutex<Vec<ThroughResult<SolveReport>>>,
}

impl RelationConstructor for NestedSolve {
    fn construct(
        &self,
        registry: &RelationshipRegistry,
        declaration: RelationDeclaration,
    ) -> ThroughResult<RelationDeclaration> {
        if declaration.kind.is_through() {
            let nested = self.scheduler.solve(&ThroughAssociations::default());
            self.results
                .lock()
                .map_err(|_| ThroughError::Lock {
                    resource: "results".to_string(),
                })?
                .push(nested);
        }
        RegistryConstructor.construct(registry, declaration)
    }
}

#[test]
fn test_solve_is_not_reentrant() {
    let scheduler = Arc::new(Scheduler::new());
    let nested = Arc::new(NestedSolve {
        scheduler: scheduler.clone(),
        results: Mutex::new(Vec::new()),
    });
    let associations = ThroughAssociations::default().with_constructor(nested.clone());
    define(&associations, &["User", "UserHasGroup", "Group"]);

    let users = scheduler.model(&associations, "User");
    users
        .one_to_many("groups", AssociationOptions::through("user_has_groups"))
        .unwrap();
    users
        .one_to_many("user_has_groups", AssociationOptions::new())
        .unwrap();
    scheduler
        .model(&associations, "UserHasGroup")
        .many_to_one("group", AssociationOptions::new())
        .unwrap();

    assert_eq!(scheduler.phase(), Phase::Idle);
    scheduler.solve(&associations).unwrap();

    let results = nested.results.lock().unwrap();
    assert_eq!(*results, vec![Err(ThroughError::SolveInProgress)]);
    assert_eq!(scheduler.phase(), Phase::Idle);
}

#[test]
fn test_failed_expansion_names_missing_relation() {
    let associations = security_schema();
    let scheduler = Scheduler::new();
    declare_all(&scheduler, &associations, DECLARATIONS[..7].iter());

    // `UserHasSecurityGroup.privileges` is never declared
    let declared = scheduler
        .model(&associations, "User")
        .one_to_many("privileges", AssociationOptions::through("security_groups"))
        .unwrap();
    assert!(declared.is_deferred());

    let err = scheduler.solve(&associations).unwrap_err();
    match &err {
        ThroughError::NoAssociationPath { tried, cause, .. } => {
            assert_eq!(tried, &vec!["User", "SecurityGroup"]);
            match cause.as_ref() {
                ThroughError::MissingAssociation { model, association, .. } => {
                    assert_eq!(model, "UserHasSecurityGroup");
                    assert_eq!(association, "privileges");
                }
                other => panic!("Expected MissingAssociation cause, got {:?}", other),
            }
        }
        other => panic!("Expected NoAssociationPath, got {:?}", other),
    }

    let message = err.to_string();
    assert!(message.contains("UserHasSecurityGroup.privileges"), "{}", message);
    assert!(message.contains("User.user_has_security_groups"), "{}", message);
}

/// Declares a relation on a second registry the first time each solve phase
/// consults the inflector
struct PhaseInflector {
    scheduler: Arc<Scheduler>,
    other: ThroughAssociations,
    seen: Mutex<Vec<(Phase, ThroughResult<Declared>)>>,
}

impl PhaseInflector {
    fn declare_once_per_phase(&self) {
        let phase = self.scheduler.phase();
        if phase == Phase::Idle {
            return;
        }
        let mut seen = self.seen.lock().unwrap();
        if seen.iter().any(|(seen_phase, _)| *seen_phase == phase) {
            return;
        }
        let result = self.scheduler.associate(
            &self.other,
            "User",
            RelationKind::OneToMany,
            "late_groups",
            AssociationOptions::through("late_memberships"),
        );
        seen.push((phase, result));
    }
}

impl Inflector for PhaseInflector {
    fn pluralize(&self, word: &str) -> String {
        self.declare_once_per_phase();
        DefaultInflector.pluralize(word)
    }

    fn singularize(&self, word: &str) -> String {
        DefaultInflector.singularize(word)
    }
}

#[test]
fn test_declarations_made_while_solving() {
    let scheduler = Arc::new(Scheduler::new());
    let other = ThroughAssociations::default();
    define(&other, &["User"]);

    let inflector = Arc::new(PhaseInflector {
        scheduler: scheduler.clone(),
        other,
        seen: Mutex::new(Vec::new()),
    });
    let associations = ThroughAssociations::default().with_inflector(inflector.clone());
    define(&associations, &["User", "Group"]);

    scheduler
        .model(&associations, "User")
        .one_to_many("groups", AssociationOptions::through("memberships"))
        .unwrap();

    assert!(scheduler.solve(&associations).is_err());

    let seen = inflector.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);

    // Queued while resolving
    assert_eq!(seen[0], (Phase::Resolving, Ok(Declared::Deferred)));

    // Raised instead of queued while finalizing
    assert_eq!(seen[1].0, Phase::Finalizing);
    assert!(matches!(
        seen[1].1,
        Err(ThroughError::MissingAssociation { .. })
    ));

    let names: Vec<String> = scheduler
        .deferred()
        .into_iter()
        .map(|deferred| deferred.request.name)
        .collect();
    assert_eq!(names, vec!["late_groups", "groups"]);
    assert_eq!(scheduler.phase(), Phase::Idle);
}
