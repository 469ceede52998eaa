use lineage_core::db::open_db_in_memory;
use lineage_core::{
    Member, MemberListQuery, MemberRepoError, MemberRepository, MemberValidationError,
    SqliteMemberRepository,
};

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member = Member::with_id("m1", "Grace Ade");
    member.email = Some("grace@example.org".to_string());
    member.church = "Central".to_string();
    member.age_group = "Adult".to_string();
    let id = repo.create_member(&member).unwrap();
    assert_eq!(id, "m1");

    let loaded = repo.get_member("m1", false).unwrap().unwrap();
    assert_eq!(loaded.full_name, "Grace Ade");
    assert_eq!(loaded.email.as_deref(), Some("grace@example.org"));
    assert_eq!(loaded.church, "Central");
    assert_eq!(loaded.age_group, "Adult");
    assert_eq!(loaded.spiritual_parent_id, None);
    assert!(!loaded.is_deleted);
}

#[test]
fn generated_ids_are_unique() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let first = repo.create_member(&Member::new("One")).unwrap();
    let second = repo.create_member(&Member::new("One")).unwrap();
    assert_ne!(first, second);
}

#[test]
fn duplicate_id_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("dup", "First")).unwrap();
    let err = repo.create_member(&Member::with_id("dup", "Second")).unwrap_err();
    assert!(matches!(err, MemberRepoError::DuplicateId(id) if id == "dup"));
}

#[test]
fn invalid_member_is_rejected_before_insert() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    let mut member = Member::with_id("bad", "Bad Email");
    member.email = Some("not-an-email".to_string());
    let err = repo.create_member(&member).unwrap_err();
    assert!(matches!(
        err,
        MemberRepoError::Validation(MemberValidationError::InvalidEmail(_))
    ));
    assert!(repo.get_member("bad", true).unwrap().is_none());
}

#[test]
fn children_are_ordered_by_name_then_id() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("p", "Parent")).unwrap();
    repo.create_member(&Member::with_id("c3", "Zack").with_parent("p")).unwrap();
    repo.create_member(&Member::with_id("c2", "Amy").with_parent("p")).unwrap();
    repo.create_member(&Member::with_id("c1", "Amy").with_parent("p")).unwrap();

    let ids: Vec<String> = repo
        .list_children("p")
        .unwrap()
        .into_iter()
        .map(|member| member.id)
        .collect();
    assert_eq!(ids, ["c1", "c2", "c3"]);
}

#[test]
fn soft_deleted_parent_turns_children_into_roots() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("p", "Parent")).unwrap();
    repo.create_member(&Member::with_id("c", "Child").with_parent("p")).unwrap();
    repo.soft_delete_member("p").unwrap();

    let roots: Vec<String> = repo.list_roots().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(roots, ["c"]);
    assert!(repo.get_member("p", false).unwrap().is_none());
    assert!(repo.get_member("p", true).unwrap().unwrap().is_deleted);

    let counts = repo.population_counts().unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.roots, 1);
    assert_eq!(counts.with_parents, 0);
}

#[test]
fn dangling_parent_reference_counts_as_root() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("a", "Anchored")).unwrap();
    repo.create_member(&Member::with_id("o", "Orphan").with_parent("missing")).unwrap();
    repo.create_member(&Member::with_id("k", "Kid").with_parent("a")).unwrap();

    let roots: Vec<String> = repo.list_roots().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(roots, ["a", "o"]);

    let counts = repo.population_counts().unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.roots, 2);
    assert_eq!(counts.with_parents, 1);
}

#[test]
fn set_spiritual_parent_updates_and_clears() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("p", "Parent")).unwrap();
    repo.create_member(&Member::with_id("c", "Child")).unwrap();

    repo.set_spiritual_parent("c", Some("p")).unwrap();
    assert_eq!(
        repo.get_member("c", false).unwrap().unwrap().spiritual_parent_id.as_deref(),
        Some("p")
    );

    repo.set_spiritual_parent("c", None).unwrap();
    assert_eq!(repo.get_member("c", false).unwrap().unwrap().spiritual_parent_id, None);

    let err = repo.set_spiritual_parent("c", Some("c")).unwrap_err();
    assert!(matches!(
        err,
        MemberRepoError::Validation(MemberValidationError::SelfParent(_))
    ));

    let err = repo.set_spiritual_parent("ghost", Some("p")).unwrap_err();
    assert!(matches!(err, MemberRepoError::NotFound(id) if id == "ghost"));
}

#[test]
fn soft_delete_twice_reports_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    repo.create_member(&Member::with_id("m", "Member")).unwrap();
    repo.soft_delete_member("m").unwrap();
    let err = repo.soft_delete_member("m").unwrap_err();
    assert!(matches!(err, MemberRepoError::NotFound(_)));
}

#[test]
fn list_members_paginates_and_filters_deleted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMemberRepository::try_new(&conn).unwrap();

    for (id, name) in [("a", "Ann"), ("b", "Ben"), ("c", "Cal"), ("d", "Dee")] {
        repo.create_member(&Member::with_id(id, name)).unwrap();
    }
    repo.soft_delete_member("b").unwrap();

    let active = repo.list_active().unwrap();
    assert_eq!(active.len(), 3);

    let everything = repo
        .list_members(&MemberListQuery {
            include_deleted: true,
            ..MemberListQuery::default()
        })
        .unwrap();
    assert_eq!(everything.len(), 4);

    let page: Vec<String> = repo
        .list_members(&MemberListQuery {
            include_deleted: false,
            limit: Some(1),
            offset: 1,
        })
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(page, ["c"]);
}
