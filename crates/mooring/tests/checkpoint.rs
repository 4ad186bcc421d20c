/// Tests for persisting parked builtins: a continuation written with `dump` and read
/// back with `load` resumes exactly where the original would have.
use mooring::{
    BuiltinData, BuiltinFunction, Continuation, Database, EngineError, ErrorCode, MemoryDb, ObjRef, ObjectFlag,
    Objid, Progress, TaskResult, Var, World,
};
use pretty_assertions::assert_eq;
use serde::Serialize;

fn setup() -> (World, Objid, Objid) {
    let mut db = MemoryDb::new();
    let wizard = db.create(&[], Objid::NOTHING);
    db.set_flag(ObjRef::Obj(wizard), ObjectFlag::Wizard);
    let root = db.create(&[], wizard);
    (World::new(db), wizard, root)
}

/// Writes `continuation` out and reads it back.
fn round_trip(continuation: &Continuation) -> Continuation {
    let bytes = continuation.dump().unwrap();
    Continuation::load(&bytes).unwrap()
}

#[test]
fn parked_create_resumes_after_reload() {
    let (mut world, wizard, root) = setup();
    world.add_verb(root, "initialize", |_, _| Var::None);

    let progress = BuiltinFunction::Create.call(&mut world, wizard, vec![Var::Obj(root)]);
    let continuation = progress.into_pending().unwrap();
    assert_eq!(continuation.function(), BuiltinFunction::Create);
    assert_eq!(continuation.next_step(), 2);
    assert_eq!(continuation.data(), &BuiltinData::Create { object: Var::Obj(Objid(2)) });

    let restored = round_trip(&continuation);
    assert_eq!(restored, continuation);
    assert_eq!(world.drive(Progress::Pending(restored)), TaskResult::Complete(Var::Obj(Objid(2))));
}

#[test]
fn parked_move_resumes_after_reload() {
    let (mut world, wizard, root) = setup();
    let thing = world.db_mut().create(&[], wizard);
    world.add_verb(root, "accept", |_, _| Var::Int(1));

    let progress = BuiltinFunction::Move.call(&mut world, wizard, vec![Var::Obj(thing), Var::Obj(root)]);
    let continuation = progress.into_pending().unwrap();
    assert_eq!(
        continuation.data(),
        &BuiltinData::Move {
            what: thing,
            where_: root
        }
    );

    let restored = round_trip(&continuation);
    assert_eq!(world.drive(Progress::Pending(restored)), TaskResult::Complete(Var::None));
    assert_eq!(world.db().location(thing), root);
}

#[test]
fn parked_recycle_resumes_after_reload() {
    let (mut world, wizard, root) = setup();
    let junk = world.db_mut().create(&[root], wizard);
    world.add_verb(junk, "recycle", |_, _| Var::None);

    let progress = BuiltinFunction::Recycle.call(&mut world, wizard, vec![Var::Obj(junk)]);
    let continuation = round_trip(&progress.into_pending().unwrap());
    assert!(world.db().has_flag(ObjRef::Obj(junk), ObjectFlag::Recycled));

    assert_eq!(world.drive(Progress::Pending(continuation)), TaskResult::Complete(Var::None));
    assert!(!world.db().valid(junk));
    assert_eq!(world.db().children(root), Vec::<Objid>::new());
}

#[test]
fn restored_continuation_revalidates_its_objects() {
    let (mut world, wizard, root) = setup();
    let thing = world.db_mut().create(&[], wizard);
    world.add_verb(root, "accept", |_, _| Var::Int(1));

    let progress = BuiltinFunction::Move.call(&mut world, wizard, vec![Var::Obj(thing), Var::Obj(root)]);
    let continuation = round_trip(&progress.into_pending().unwrap());
    // the object vanished while the checkpoint was on disk
    world.db_mut().destroy_object(thing);

    let resumed = continuation.resume(Var::Int(1), &mut world);
    assert_eq!(resumed.into_complete(), Some(Var::None));
    assert_eq!(world.db().contents(root), Vec::<Objid>::new());
}

// =============================================================================
// Corrupt checkpoints
// =============================================================================

/// Same shape as a serialized continuation, with fields a real one never holds.
#[derive(Serialize)]
struct Forged {
    function: BuiltinFunction,
    progr: Objid,
    next: u8,
    data: BuiltinData,
}

fn forge(function: BuiltinFunction, next: u8, data: BuiltinData) -> Continuation {
    let bytes = postcard::to_allocvec(&Forged {
        function,
        progr: Objid(0),
        next,
        data,
    })
    .unwrap();
    Continuation::load(&bytes).unwrap()
}

fn resume_error(continuation: Continuation, world: &mut World) -> Option<ErrorCode> {
    match continuation.resume(Var::Int(0), world) {
        Progress::Error(err) => Some(err.code),
        _ => None,
    }
}

#[test]
fn unknown_step_is_an_invalid_argument() {
    let (mut world, _, root) = setup();
    let data = BuiltinData::Move {
        what: root,
        where_: Objid::NOTHING,
    };

    assert_eq!(resume_error(forge(BuiltinFunction::Move, 9, data.clone()), &mut world), Some(ErrorCode::InvArg));
    assert_eq!(resume_error(forge(BuiltinFunction::Move, 1, data), &mut world), Some(ErrorCode::InvArg));
    let data = BuiltinData::Create { object: Var::Obj(root) };
    assert_eq!(resume_error(forge(BuiltinFunction::Create, 0, data), &mut world), Some(ErrorCode::InvArg));
}

#[test]
fn state_of_another_builtin_is_an_invalid_argument() {
    let (mut world, _, root) = setup();
    let data = BuiltinData::Recycle { object: Var::Obj(root) };

    assert_eq!(resume_error(forge(BuiltinFunction::Create, 2, data.clone()), &mut world), Some(ErrorCode::InvArg));
    assert_eq!(resume_error(forge(BuiltinFunction::Valid, 2, data), &mut world), Some(ErrorCode::InvArg));
    assert!(world.db().valid(root));
}

#[test]
fn truncated_checkpoint_fails_to_load() {
    let (mut world, wizard, root) = setup();
    world.add_verb(root, "initialize", |_, _| Var::None);
    let progress = BuiltinFunction::Create.call(&mut world, wizard, vec![Var::Obj(root)]);
    let bytes = progress.into_pending().unwrap().dump().unwrap();

    let err = EngineError::from(Continuation::load(&bytes[..bytes.len() - 1]).unwrap_err());
    assert!(err.to_string().starts_with("checkpoint error"), "{err}");
}

#[test]
fn only_verb_calling_builtins_are_checkpointed() {
    assert!(BuiltinFunction::Create.has_checkpoint());
    assert!(BuiltinFunction::Recycle.has_checkpoint());
    assert!(BuiltinFunction::Move.has_checkpoint());
    assert!(!BuiltinFunction::Exec.has_checkpoint());
    assert!(!BuiltinFunction::Chparent.has_checkpoint());
}
