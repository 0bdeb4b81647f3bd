//! Unit tests for conduit-core: cache manager scenarios and graph properties

use crate::cache::{self, CacheManager, StaleReason};
use crate::test_utils::*;
use crate::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

struct Tracked {
    _dir: TempDir,
    manager: CacheManager,
    route: PathBuf,
    repo: PathBuf,
}

/// A manager that has parsed `users/route.go`, which depends on `user_repo.go`.
fn tracked_users_repo() -> Tracked {
    let dir = create_users_repo();
    let route = dir.path().join("api/v1/users/route.go");
    let repo = dir.path().join("api/v1/users/user_repo/user_repo.go");

    let manager = CacheManager::new();
    assert!(manager.get_parsed_file(&route).unwrap().is_none());
    manager
        .set_parsed_file(
            &route,
            Arc::new(parsed_route(&route, "api/v1/users", &[repo.clone()])),
        )
        .unwrap();

    Tracked {
        _dir: dir,
        manager,
        route,
        repo,
    }
}

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

#[test]
fn test_parsed_file_served_until_content_changes() {
    let t = tracked_users_repo();
    assert!(t.manager.get_parsed_file(&t.route).unwrap().is_some());

    fs::write(&t.route, format!("{USERS_ROUTE}\nfunc POST() {{}}\n")).unwrap();
    assert!(t.manager.get_parsed_file(&t.route).unwrap().is_none());
}

#[test]
fn test_set_parsed_file_wires_graph() {
    let t = tracked_users_repo();
    assert!(t.manager.is_tracked(&t.repo));
    assert_eq!(t.manager.affected_files(&t.repo), vec![t.route.clone()]);
}

#[test]
fn test_touch_only_write_yields_empty_plan() {
    let t = tracked_users_repo();

    let file = fs::OpenOptions::new().write(true).open(&t.route).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(120))
        .unwrap();
    drop(file);

    let plan = t
        .manager
        .handle_file_change(&ChangeEvent::new(&t.route, ChangeKind::Write))
        .unwrap();
    assert!(plan.affected_files.is_empty());
    assert!(!t.manager.is_dirty(&t.route));
}

#[test]
fn test_deleting_dependency_marks_dependents_highest() {
    let t = tracked_users_repo();
    fs::remove_file(&t.repo).unwrap();

    let plan = t
        .manager
        .handle_file_change(&ChangeEvent::new(&t.repo, ChangeKind::Delete))
        .unwrap();

    assert_eq!(plan.affected_files, vec![t.route.clone()]);
    assert_eq!(plan.priority_of(&t.route), Some(Priority::Highest));
    assert_eq!(
        plan.reason(&t.route),
        Some(format!("dependency deleted: {}", t.repo.display()).as_str())
    );
    assert!(!t.manager.is_tracked(&t.repo));
}

#[test]
fn test_dependency_write_propagates() {
    let t = tracked_users_repo();
    fs::write(&t.repo, format!("{USER_REPO}\nfunc Count() int {{ return 0 }}\n")).unwrap();

    let plan = t
        .manager
        .handle_file_change(&ChangeEvent::new(&t.repo, ChangeKind::Write))
        .unwrap();

    assert_eq!(plan.affected_files, vec![t.route.clone(), t.repo.clone()]);
    assert_eq!(plan.priority_of(&t.route), Some(Priority::Normal));
    assert_eq!(plan.priority_of(&t.repo), Some(Priority::Elevated));
    assert_eq!(plan.reason(&t.repo), Some("file content changed"));
    assert_eq!(plan.regeneration_map[&t.repo], vec![t.route.clone()]);

    assert_eq!(
        t.manager.take_dirty(),
        vec![
            (t.repo.clone(), Priority::Elevated),
            (t.route.clone(), Priority::Normal)
        ]
    );
    assert!(t.manager.take_dirty().is_empty());
}

#[test]
fn test_dirty_set_keeps_highest_priority() {
    let t = tracked_users_repo();
    fs::write(&t.repo, "package user_repo\n\nvar changed = true\n").unwrap();
    t.manager
        .handle_file_change(&ChangeEvent::new(&t.repo, ChangeKind::Write))
        .unwrap();
    fs::remove_file(&t.repo).unwrap();
    t.manager
        .handle_file_change(&ChangeEvent::new(&t.repo, ChangeKind::Delete))
        .unwrap();
    t.manager
        .handle_file_change(&ChangeEvent::new(&t.route, ChangeKind::Write))
        .unwrap();

    let dirty = t.manager.take_dirty();
    assert_eq!(dirty[0], (t.route.clone(), Priority::Highest));
}

#[test]
fn test_regeneration_plan_ledger_overrides_propagation() {
    let t = tracked_users_repo();

    let plan = t
        .manager
        .regeneration_plan(&[t.repo.clone(), t.route.clone()])
        .unwrap();
    assert_eq!(plan.reason(&t.route), Some("no generation record found"));
    assert_eq!(plan.priority_of(&t.route), Some(Priority::Elevated));

    t.manager
        .mark_generated(&t.route, Path::new("out/api/v1/users/gen_route.go"))
        .unwrap();
    let plan = t.manager.regeneration_plan(&[t.repo.clone()]).unwrap();
    assert_eq!(
        plan.reason(&t.route),
        Some(format!("depends on changed file: {}", t.repo.display()).as_str())
    );
    assert_eq!(plan.priority_of(&t.route), Some(Priority::Normal));

    let plan = t.manager.regeneration_plan(&[t.route.clone()]).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn test_regeneration_plan_first_writer_wins() {
    let graph_manager = CacheManager::new();
    let route = p("/p/route.go");
    graph_manager
        .set_parsed_file(
            &route,
            Arc::new(parsed_route(&route, "p", &[p("/p/a.go"), p("/p/b.go")])),
        )
        .unwrap();

    let plan = graph_manager
        .regeneration_plan(&[p("/p/b.go"), p("/p/a.go")])
        .unwrap();
    assert_eq!(plan.affected_files, vec![route.clone()]);
    assert_eq!(plan.reason(&route), Some("depends on changed file: /p/b.go"));
}

#[test]
fn test_mark_generated_requires_content() {
    let manager = CacheManager::new();
    let err = manager
        .mark_generated(Path::new("/nowhere/route.go"), Path::new("out.go"))
        .unwrap_err();
    assert!(matches!(err, CacheError::MissingContent { .. }));
}

#[test]
fn test_needs_regeneration_round_trip() {
    let t = tracked_users_repo();
    assert_eq!(
        t.manager.needs_regeneration(&t.route).unwrap(),
        Some(StaleReason::NoRecord)
    );
    t.manager
        .mark_generated(&t.route, Path::new("gen_route.go"))
        .unwrap();
    assert_eq!(t.manager.needs_regeneration(&t.route).unwrap(), None);

    t.manager
        .set_current_template_hash(ContentHash::from_bytes(b"new template"));
    assert_eq!(
        t.manager.needs_regeneration(&t.route).unwrap(),
        Some(StaleReason::TemplateChanged)
    );
}

#[test]
fn test_validate_integrity_reports_orphans_and_cycles() {
    let manager = CacheManager::new();
    let a = p("/p/a/route.go");
    let b = p("/p/b/route.go");
    manager
        .set_parsed_file(&a, Arc::new(parsed_route(&a, "a", &[b.clone()])))
        .unwrap();
    manager
        .set_parsed_file(&b, Arc::new(parsed_route(&b, "b", &[a.clone()])))
        .unwrap();

    let report = manager.validate_integrity();
    assert_eq!(report.orphan_parses, vec![a.clone(), b.clone()]);
    assert_eq!(report.cycles.len(), 1);
    assert!(!report.is_clean());
    assert!(matches!(
        manager.topological_order(),
        Err(CacheError::Graph(GraphError::Cycle { sorted: 0, total: 2 }))
    ));
}

#[test]
fn test_registry_signature() {
    let manager = CacheManager::new();
    let routes = vec!["users".to_string(), "users/id_".to_string()];
    assert!(manager.needs_registry_regeneration(&routes));

    manager.set_registry_signature(RegistrySignature::from_route_paths(&routes));
    let reordered = vec!["users/id_".to_string(), "users".to_string()];
    assert!(!manager.needs_registry_regeneration(&reordered));
    assert!(manager.needs_registry_regeneration(&routes[..1]));
}

#[test]
fn test_warm_cache_skips_excluded() {
    let dir = create_repo_with_structure(&[
        ("users/route.go", "package users"),
        ("users/id_/route.go", "package id_"),
        ("node_modules/x/route.go", "package x"),
        (".conduit/generated/routes/users/route.go", "package users"),
        ("users/helper.go", "package users"),
    ]);
    let manager = CacheManager::new();
    let exclude = ExcludeSet::new(dir.path(), &[p(".conduit/generated")], &[]).unwrap();

    assert_eq!(manager.warm_cache(dir.path(), &exclude), 2);
    assert_eq!(manager.stats()["content"].total_files, 2);
}

#[test]
fn test_clear_resets_every_layer() {
    let t = tracked_users_repo();
    t.manager
        .mark_generated(&t.route, Path::new("gen_route.go"))
        .unwrap();
    t.manager.clear();

    let stats = t.manager.stats();
    assert_eq!(stats["content"].total_files, 0);
    assert_eq!(stats["parse"].total_files, 0);
    assert_eq!(stats["dependency"].dependency_nodes, 0);
    assert_eq!(stats["generation"].generation_entries, 0);
    assert!(t.manager.generated_files().is_empty());
}

#[test]
fn test_global_reset() {
    let first = cache::global();
    let again = cache::global();
    assert!(Arc::ptr_eq(&first, &again));

    cache::reset_global();
    assert!(!Arc::ptr_eq(&first, &cache::global()));

    let custom = Arc::new(CacheManager::new());
    cache::set_global(Arc::clone(&custom));
    assert!(Arc::ptr_eq(&custom, &cache::global()));
    cache::reset_global();
}

// Graph properties

fn edges() -> Vec<(&'static str, &'static str)> {
    vec![
        ("route_a", "repo"),
        ("route_b", "repo"),
        ("repo", "model"),
        ("route_c", "model"),
        ("route_a", "util"),
    ]
}

fn build(order: &[(&str, &str)]) -> DependencyGraph {
    let graph = DependencyGraph::new();
    let mut deps: std::collections::BTreeMap<&str, Vec<PathBuf>> = Default::default();
    for (from, to) in order {
        deps.entry(from).or_default().push(p(to));
        graph.update_node(&p(from), &deps[from]);
    }
    graph
}

#[test]
fn test_affected_files_independent_of_insertion_order() {
    let forward = build(&edges());
    let mut reversed = edges();
    reversed.reverse();
    let backward = build(&reversed);

    for node in ["model", "repo", "util", "route_a"] {
        assert_eq!(
            forward.affected_files(&p(node)),
            backward.affected_files(&p(node)),
            "mismatch for {node}"
        );
    }
    assert_eq!(
        forward.affected_files(&p("model")),
        vec![p("repo"), p("route_a"), p("route_b"), p("route_c")]
    );
}

#[test]
fn test_remove_node_leaves_no_references() {
    let graph = build(&edges());
    graph.remove_node(&p("repo"));
    for node in ["route_a", "route_b", "model", "route_c", "util"] {
        let n = graph.node(&p(node)).unwrap();
        assert!(!n.dependencies.contains(&p("repo")));
        assert!(!n.dependents.contains(&p("repo")));
    }
}

#[test]
fn test_detect_two_node_cycle() {
    let graph = build(&[("a", "b"), ("b", "a")]);
    let cycles = graph.detect_cycles();
    assert_eq!(cycles.len(), 1);
    let mut members = cycles[0].clone();
    members.sort();
    assert_eq!(members, vec![p("a"), p("b")]);
}

#[test]
fn test_acyclic_graph_has_no_cycles() {
    assert!(build(&edges()).detect_cycles().is_empty());
    assert!(DependencyGraph::new().detect_cycles().is_empty());
}

#[test]
fn test_topological_order_respects_dependencies() {
    let graph = build(&edges());
    let order = graph.topological_order().unwrap();
    assert_eq!(order.len(), 6);
    let pos = |n: &str| order.iter().position(|x| x == &p(n)).unwrap();
    for (from, to) in edges() {
        assert!(pos(to) < pos(from), "{to} must precede {from}");
    }

    let cyclic = build(&[("a", "b"), ("b", "a"), ("c", "a")]);
    assert!(matches!(
        cyclic.topological_order(),
        Err(GraphError::Cycle { sorted: 0, total: 3 })
    ));
}

#[test]
fn test_build_graph_creates_placeholders() {
    let route = p("/p/route.go");
    let parsed = parsed_route(&route, "p", &[p("/p/repo.go")]);
    let graph = DependencyGraph::new();
    graph.build_graph([&parsed]);

    assert_eq!(graph.counts(), GraphStats { nodes: 2, edges: 1 });
    assert_eq!(graph.dependents(&p("/p/repo.go")), vec![route]);
}

#[test]
fn test_build_graph_tags_packages_and_external_imports() {
    let route = p("/p/route.go");
    let mut parsed = parsed_route(&route, "p", &[p("/p/repo/repo.go")]);
    parsed.dependencies.local_imports[0].package_dir = Some(p("/p/repo"));
    parsed.dependencies.external_imports = vec!["github.com/go-chi/chi".to_string()];
    let graph = DependencyGraph::new();
    graph.build_graph([&parsed]);

    let kind = |node: &str| graph.node(&p(node)).unwrap().kind;
    assert_eq!(kind("/p/route.go"), NodeKind::Source);
    assert_eq!(kind("/p/repo/repo.go"), NodeKind::Source);
    assert_eq!(kind("/p/repo"), NodeKind::Package);
    assert_eq!(kind("github.com/go-chi/chi"), NodeKind::External);
}

#[test]
fn test_file_added_to_package_marks_importers() {
    let dir = create_users_repo();
    let route = dir.path().join("api/v1/users/route.go");
    let package = dir.path().join("api/v1/users/user_repo");
    let repo = package.join("user_repo.go");
    let mut parsed = parsed_route(&route, "api/v1/users", &[repo.clone()]);
    parsed.dependencies.local_imports[0].package_dir = Some(package.clone());

    let manager = CacheManager::new();
    assert!(manager.get_parsed_file(&route).unwrap().is_none());
    manager.set_parsed_file(&route, Arc::new(parsed)).unwrap();
    assert_eq!(manager.affected_files(&package), vec![route.clone()]);

    let extra = package.join("extra.go");
    assert!(!manager.is_tracked(&extra));
    assert!(manager.is_watched_dependency(&extra));
    assert!(!manager.is_watched_dependency(&dir.path().join("api/v1/other.go")));

    fs::write(&extra, "package user_repo\n").unwrap();
    let plan = manager
        .handle_file_change(&ChangeEvent::new(&extra, ChangeKind::Create))
        .unwrap();
    assert_eq!(
        plan.reason(&route),
        Some(format!("package changed: {}", package.display()).as_str())
    );
    assert_eq!(plan.priority_of(&route), Some(Priority::Normal));
    assert!(manager.is_dirty(&route));

    manager.take_dirty();
    fs::remove_file(&extra).unwrap();
    let plan = manager
        .handle_file_change(&ChangeEvent::new(&extra, ChangeKind::Delete))
        .unwrap();
    assert!(plan.is_affected(&route));
    assert!(manager.is_dirty(&route));
}
