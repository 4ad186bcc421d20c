/// Tests for chparent()/chparents(): cycle rejection, permissions, atomicity and
/// anonymous children surviving a parent change.
use mooring::{
    BuiltinFunction, Database, ErrorCode, MemoryDb, ObjRef, ObjectFlag, Objid, TaskResult, Var, World,
};
use pretty_assertions::assert_eq;

/// A wizard (#0), a player (#1) and a fertile `root` (#2) owned by the wizard.
fn setup() -> (World, Objid, Objid, Objid) {
    let mut db = MemoryDb::new();
    let wizard = db.create(&[], Objid::NOTHING);
    db.set_flag(ObjRef::Obj(wizard), ObjectFlag::Wizard);
    let player = db.create(&[], Objid::NOTHING);
    let root = db.create(&[], wizard);
    db.set_flag(ObjRef::Obj(root), ObjectFlag::Fertile);
    db.set_flag(ObjRef::Obj(root), ObjectFlag::Anonymous);
    (World::new(db), wizard, player, root)
}

fn chparent(world: &mut World, progr: Objid, args: Vec<Var>) -> TaskResult {
    world.run_builtin(progr, BuiltinFunction::Chparent, args)
}

fn chparents(world: &mut World, progr: Objid, args: Vec<Var>) -> TaskResult {
    world.run_builtin(progr, BuiltinFunction::Chparents, args)
}

fn error_code(result: TaskResult) -> Option<ErrorCode> {
    result.into_error().map(|err| err.code)
}

// =============================================================================
// Cycles
// =============================================================================

#[test]
fn descendant_as_parent_is_a_recursive_move() {
    let (mut world, wizard, _, root) = setup();
    let child = world.db_mut().create(&[root], wizard);
    let grandchild = world.db_mut().create(&[child], wizard);

    let result = chparent(&mut world, wizard, vec![Var::Obj(root), Var::Obj(grandchild)]);
    assert_eq!(error_code(result), Some(ErrorCode::RecMove));
    assert_eq!(world.db().parents(ObjRef::Obj(root)), Vec::<Objid>::new());
    assert_eq!(world.db().parents(ObjRef::Obj(grandchild)), vec![child]);
}

#[test]
fn self_as_parent_is_a_recursive_move() {
    let (mut world, wizard, _, root) = setup();

    let result = chparents(&mut world, wizard, vec![Var::Obj(root), Var::obj_list([root])]);
    assert_eq!(error_code(result), Some(ErrorCode::RecMove));
}

// =============================================================================
// Successful changes
// =============================================================================

#[test]
fn chparent_replaces_every_parent() {
    let (mut world, wizard, player, root) = setup();
    let other = world.db_mut().create(&[], player);
    let thing = world.db_mut().create(&[root, other], player);

    let result = chparent(&mut world, player, vec![Var::Obj(thing), Var::Obj(other)]);
    assert_eq!(result, TaskResult::Complete(Var::None));
    assert_eq!(world.db().parents(ObjRef::Obj(thing)), vec![other]);
    assert_eq!(world.db().children(root), Vec::<Objid>::new());
    assert_eq!(world.db().children(other), vec![thing]);

    let result = chparent(&mut world, wizard, vec![Var::Obj(thing), Var::Obj(Objid::NOTHING)]);
    assert_eq!(result, TaskResult::Complete(Var::None));
    assert_eq!(world.db().parents(ObjRef::Obj(thing)), Vec::<Objid>::new());
}

#[test]
fn chparents_keeps_the_given_order() {
    let (mut world, _, player, root) = setup();
    let other = world.db_mut().create(&[], player);
    let thing = world.db_mut().create(&[], player);

    let result = chparents(&mut world, player, vec![Var::Obj(thing), Var::obj_list([other, root])]);
    assert_eq!(result, TaskResult::Complete(Var::None));
    assert_eq!(world.db().parents(ObjRef::Obj(thing)), vec![other, root]);
    assert_eq!(world.db().ancestors(ObjRef::Obj(thing)), vec![other, root]);
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn duplicate_parents_change_nothing() {
    let (mut world, _, player, root) = setup();
    let thing = world.db_mut().create(&[], player);

    let result = chparents(&mut world, player, vec![Var::Obj(thing), Var::obj_list([root, root])]);
    assert_eq!(error_code(result), Some(ErrorCode::InvArg));
    assert_eq!(world.db().parents(ObjRef::Obj(thing)), Vec::<Objid>::new());
}

#[test]
fn infertile_parent_is_denied() {
    let (mut world, wizard, player, _) = setup();
    let closed = world.db_mut().create(&[], wizard);
    let thing = world.db_mut().create(&[], player);

    let result = chparent(&mut world, player, vec![Var::Obj(thing), Var::Obj(closed)]);
    assert_eq!(error_code(result), Some(ErrorCode::Perm));
}

#[test]
fn only_the_owner_may_reparent() {
    let (mut world, wizard, player, root) = setup();
    let thing = world.db_mut().create(&[], wizard);

    let result = chparent(&mut world, player, vec![Var::Obj(thing), Var::Obj(root)]);
    assert_eq!(error_code(result), Some(ErrorCode::Perm));
}

#[test]
fn invalid_objects_are_rejected() {
    let (mut world, wizard, _, root) = setup();

    let result = chparent(&mut world, wizard, vec![Var::Obj(Objid(50)), Var::Obj(root)]);
    assert_eq!(error_code(result), Some(ErrorCode::InvArg));
    let result = chparent(&mut world, wizard, vec![Var::Obj(root), Var::Obj(Objid(50))]);
    assert_eq!(error_code(result), Some(ErrorCode::InvArg));
}

#[test]
fn malformed_arguments_are_type_errors() {
    let (mut world, wizard, _, root) = setup();

    let result = chparent(&mut world, wizard, vec![Var::Int(2), Var::Obj(root)]);
    assert_eq!(error_code(result), Some(ErrorCode::Type));
    let result = chparents(&mut world, wizard, vec![Var::Obj(root), Var::List(vec![Var::Int(1)])]);
    assert_eq!(error_code(result), Some(ErrorCode::Type));
    let result = chparent(&mut world, wizard, vec![Var::Obj(root), Var::List(Vec::new())]);
    assert_eq!(error_code(result), Some(ErrorCode::Type));
}

// =============================================================================
// Anonymous children
// =============================================================================

fn anonymous_child(world: &mut World, progr: Objid, parent: Objid) -> mooring::AnonId {
    let created = world.run_builtin(progr, BuiltinFunction::Create, vec![Var::Obj(parent), Var::Int(1)]);
    match created.into_complete() {
        Some(Var::Anon(anon)) => anon,
        other => panic!("expected an anonymous object, got {other:?}"),
    }
}

#[test]
fn reparenting_invalidates_unlisted_anonymous_children() {
    let (mut world, wizard, _, root) = setup();
    let base = world.db_mut().create(&[], wizard);
    let kept = anonymous_child(&mut world, wizard, root);
    let dropped = anonymous_child(&mut world, wizard, root);

    let args = vec![Var::Obj(root), Var::Obj(base), Var::List(vec![Var::Anon(kept)])];
    assert_eq!(chparent(&mut world, wizard, args), TaskResult::Complete(Var::None));
    let db = world.db();
    assert!(db.is_valid(ObjRef::Anon(kept)));
    assert!(!db.is_valid(ObjRef::Anon(dropped)));
    assert_eq!(db.anonymous_children(ObjRef::Obj(root)), vec![kept]);
    assert_eq!(db.ancestors(ObjRef::Anon(kept)), vec![root, base]);
}

#[test]
fn keeping_anonymous_children_is_for_wizards() {
    let (mut world, _, player, root) = setup();
    let thing = world.db_mut().create(&[], player);

    let args = vec![Var::Obj(thing), Var::Obj(root), Var::List(Vec::new())];
    assert_eq!(error_code(chparent(&mut world, player, args)), Some(ErrorCode::Perm));
}

#[test]
fn kept_list_must_hold_only_anonymous_children() {
    let (mut world, wizard, _, root) = setup();
    let base = world.db_mut().create(&[], wizard);

    let args = vec![Var::Obj(root), Var::Obj(base), Var::List(vec![Var::Obj(base)])];
    assert_eq!(error_code(chparent(&mut world, wizard, args)), Some(ErrorCode::InvArg));

    let stranger = anonymous_child(&mut world, wizard, base);
    let args = vec![Var::Obj(root), Var::Obj(base), Var::List(vec![Var::Anon(stranger)])];
    assert_eq!(error_code(chparent(&mut world, wizard, args)), Some(ErrorCode::InvArg));
    assert_eq!(world.db().parents(ObjRef::Obj(root)), Vec::<Objid>::new());
}
