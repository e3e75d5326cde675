// End-to-end scenarios over real C++ sources.

use std::fs;
use std::path::{Path, PathBuf};

use callscope::application::DumpUsecase;
use callscope::domain::callable::CallableId;
use callscope::domain::callgraph::CallGraphIndex;
use callscope::domain::error::CallGraphError;
use callscope::domain::identity::DisplayPaths;
use callscope::domain::session::CallTreeSession;
use callscope::infrastructure::cpp_provider::CppAnalysisProvider;
use callscope::ports::NoopObserver;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    fs::canonicalize(path).unwrap()
}

fn session() -> CallTreeSession {
    CallTreeSession::new(Box::new(CppAnalysisProvider::new()), Box::new(NoopObserver))
}

fn compile_commands(dir: &Path, files: &[&str]) -> PathBuf {
    let root = fs::canonicalize(dir).unwrap();
    let entries: Vec<serde_json::Value> = files
        .iter()
        .map(|file| {
            serde_json::json!({
                "directory": root,
                "file": file,
                "command": format!("c++ -std=c++17 -c {} -o {}.o", file, file),
            })
        })
        .collect();
    let path = root.join("compile_commands.json");
    fs::write(&path, serde_json::to_string_pretty(&entries).unwrap()).unwrap();
    path
}

#[test]
fn dump_prints_nested_callees() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "file.cpp", "void g(){} void f(){ g(); }\n");

    let text = DumpUsecase::new(Box::new(CppAnalysisProvider::new()))
        .dump(&CallableId::from("f()"), &file, false, &[])
        .unwrap();
    assert_eq!(text, "f()\n  g()\n");
}

#[test]
fn definition_is_found_in_another_file() {
    let dir = TempDir::new().unwrap();
    let g = write(dir.path(), "g.cpp", "extern void f();\nvoid g() { f(); }\n");
    write(dir.path(), "f.cpp", "void f() { f(); }\n");
    let db = compile_commands(dir.path(), &["g.cpp", "f.cpp"]);

    let mut session = session();
    session.open(&db).unwrap();
    session.select_translation_unit(&g, false).unwrap();
    session.select_root(&CallableId::from("g()")).unwrap();

    let f = CallableId::from("f()");
    assert!(!session.lookup(&f).unwrap().is_definition);
    assert!(session.callees_of(&f).is_empty());

    let resolution = session.load_definition(&f).unwrap();
    assert!(resolution.callable.is_definition);
    assert!(resolution.failures.is_empty());
    let callees = session.callees_of(&f);
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].id, f);
}

#[test]
fn included_root_is_called_from_nowhere() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "file.cpp", "void f(); void g(){ f(); }\n");

    let mut session = session();
    session.open(&file).unwrap();
    session.select_translation_unit(&file, false).unwrap();
    session.select_root(&CallableId::from("g()")).unwrap();
    session.include(&CallableId::from("g()")).unwrap();
    session.include(&CallableId::from("f()")).unwrap();

    assert_eq!(
        session.export().unwrap(),
        "@startuml\n\n \
         -> \"file.cpp\": void g()\n\
         activate \"file.cpp\"\n\
         \"file.cpp\" -> \"file.cpp\": void f()\n\
         activate \"file.cpp\"\n\
         deactivate \"file.cpp\"\n\
         deactivate \"file.cpp\"\n\
         \n@enduml"
    );
}

#[test]
fn methods_belong_to_their_class() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "foo.cpp",
        "class Foo { void bar(); void baz(){ bar(); } };\n",
    );

    let mut session = session();
    session.open(&file).unwrap();
    let declared = session.select_translation_unit(&file, false).unwrap();
    let ids: Vec<&str> = declared.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["Foo::bar()", "Foo::baz()"]);

    session.select_root(&CallableId::from("Foo::baz()")).unwrap();
    session.include(&CallableId::from("Foo::baz()")).unwrap();
    session.include(&CallableId::from("Foo::bar()")).unwrap();

    let diagram = session.export().unwrap();
    assert!(diagram.contains(" -> \"Foo\": void Foo::baz()\n"));
    assert!(diagram.contains("\"Foo\" -> \"Foo\": void Foo::bar()\n"));
    assert!(!diagram.contains("foo.cpp"));
}

#[test]
fn failed_ingest_leaves_the_index_unchanged() {
    let dir = TempDir::new().unwrap();
    let good = write(dir.path(), "good.cpp", "void ok() {}\n");
    let bad = write(dir.path(), "bad.cpp", "void broken( {\n");

    let mut index = CallGraphIndex::new(
        Box::new(CppAnalysisProvider::new()),
        DisplayPaths::new(Some(fs::canonicalize(dir.path()).unwrap())),
    );
    index.ingest(&good, &[], false).unwrap();
    assert_eq!(index.len(), 1);

    let missing = index.ingest(&dir.path().join("missing.cpp"), &[], false);
    assert!(matches!(missing, Err(CallGraphError::SourceNotFound(_))));

    match index.ingest(&bad, &[], false) {
        Err(CallGraphError::AnalysisError { file, diagnostics }) => {
            assert_eq!(file, bad);
            assert!(diagnostics.iter().all(|d| d.line >= 1 && d.column >= 1));
        }
        other => panic!("expected an analysis error, got {:?}", other.map(|r| r.updated)),
    }
    assert_eq!(index.len(), 1);
    assert!(!index.is_ingested(&bad));
    assert!(index.is_ingested(&good));
}

#[test]
fn headers_found_through_include_directories() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("include")).unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    write(
        dir.path(),
        "include/shape.h",
        "namespace geo {\nstruct Shape {\n  double area() const;\n};\n}\n",
    );
    write(
        dir.path(),
        "src/shape.cpp",
        "#include <shape.h>\nnamespace geo {\ndouble Shape::area() const { return 0.0; }\n}\n",
    );
    let main = write(
        dir.path(),
        "src/main.cpp",
        "#include <shape.h>\nint main() {\n  geo::Shape s;\n  s.area();\n  return 0;\n}\n",
    );
    let root = fs::canonicalize(dir.path()).unwrap();
    let db = root.join("compile_commands.json");
    fs::write(
        &db,
        serde_json::to_string(&serde_json::json!([
            {"directory": root.join("src"), "file": "main.cpp", "arguments": ["c++", "-I../include", "-c", "main.cpp"]},
            {"directory": root.join("src"), "file": "shape.cpp", "arguments": ["c++", "-I../include", "-c", "shape.cpp"]}
        ]))
        .unwrap(),
    )
    .unwrap();

    let mut session = session();
    session.open(&db).unwrap();
    session.select_translation_unit(&main, false).unwrap();
    session.select_root(&CallableId::from("main()")).unwrap();

    let area = CallableId::from("geo::Shape::area()");
    let callees = session.callees_of(&CallableId::from("main()"));
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].id, area);
    assert_eq!(callees[0].participant, "geo::Shape");
    assert_eq!(callees[0].qualified_name, "double geo::Shape::area()");

    let resolution = session.load_definition(&area).unwrap();
    assert!(resolution.callable.is_definition);
    assert_eq!(resolution.callable.source_file, root.join("src/shape.cpp"));
}

#[test]
fn header_declared_callee_resolves_near_the_calling_unit() {
    let dir = TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    fs::create_dir_all(root.join("include")).unwrap();
    fs::create_dir_all(root.join("src/app")).unwrap();
    write(&root, "include/api.h", "void f();\n");
    let alt = write(&root, "include/f_alt.cpp", "void f() {}\n");
    let near = write(&root, "src/app/f.cpp", "void helper() {}\nvoid f() { helper(); }\n");
    let main = write(&root, "src/app/main.cpp", "#include <api.h>\nint main() {\n  f();\n  return 0;\n}\n");

    let db = root.join("compile_commands.json");
    fs::write(
        &db,
        serde_json::to_string(&serde_json::json!([
            {"directory": root.join("src/app"), "file": "main.cpp", "arguments": ["c++", "-I../../include", "-c", "main.cpp"]},
            {"directory": root.join("include"), "file": "f_alt.cpp", "arguments": ["c++", "-c", "f_alt.cpp"]},
            {"directory": root.join("src/app"), "file": "f.cpp", "arguments": ["c++", "-c", "f.cpp"]}
        ]))
        .unwrap(),
    )
    .unwrap();

    let mut session = session();
    session.open(&db).unwrap();
    session.select_translation_unit(&main, false).unwrap();
    session.select_root(&CallableId::from("main()")).unwrap();

    let f = CallableId::from("f()");
    assert_eq!(session.lookup(&f).unwrap().source_file, root.join("include/api.h"));

    let resolution = session.load_definition(&f).unwrap();
    assert_eq!(resolution.attempted, vec![near.clone()]);
    assert_eq!(resolution.callable.source_file, near);
    assert!(!session.index().is_ingested(&alt));
    assert_eq!(session.callees_of(&f)[0].id, CallableId::from("helper()"));
}
