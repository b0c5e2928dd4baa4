//! End-to-end protocol scenarios, driven through in-process batch
//! handoff.

use modmap_ipc::prelude::*;

/// Feed one request batch through `resolver` and return the dispatch
/// outcome plus the response batch text.
fn run_batch(
    server: &mut MapperServer,
    resolver: &mut dyn Resolver,
    batch: &str,
) -> (Dispatch, String) {
    server
        .accept_batch(batch.as_bytes().to_vec())
        .expect("batch loads");
    let outcome = server.parse_requests(resolver);
    server.prepare_to_write();
    let bytes = server.take_response_batch();
    (outcome, String::from_utf8(bytes).expect("utf-8 responses"))
}

#[test]
fn mixed_batch_gets_one_response_per_request() {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();

    let (_, out) = run_batch(
        &mut server,
        &mut resolver,
        "HELLO 0 TEST IDENT ;\n\
         MODULE-REPO ;\n\
         MODULE-EXPORT bar ;\n\
         MODULE-IMPORT foo ;\n\
         NOT A COMMAND ;\n\
         INCLUDE-TRANSLATE baz.frob ;\n\
         INCLUDE-TRANSLATE ./quux ;\n\
         MODULE-COMPILED bar ;\n\
         MODULE-IMPORT ''\n",
    );

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        [
            "HELLO 0 default ;",
            "MODULE-REPO cmi.cache ;",
            "MODULE-CMI bar.cmi ;",
            "MODULE-CMI foo.cmi ;",
            "ERROR 'unrecognized_request NOT A COMMAND' ;",
            "INCLUDE-TEXT ;",
            "INCLUDE-TEXT ;",
            "OK ;",
            "ERROR 'malformed_request MODULE-IMPORT \\'\\''",
        ]
    );
}

#[test]
fn double_hello_in_one_batch() {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();

    let (_, out) = run_batch(
        &mut server,
        &mut resolver,
        "HELLO 1 X Y ;\nHELLO 1 X Y\n",
    );
    assert_eq!(out, "HELLO 1 default ;\nERROR 'already_connected'\n");
    assert!(server.is_connected());
}

#[test]
fn requests_straddling_the_handshake() {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();

    let (_, out) = run_batch(
        &mut server,
        &mut resolver,
        "MODULE-REPO ;\nHELLO 1 X Y ;\nMODULE-REPO\n",
    );
    assert_eq!(
        out,
        "ERROR 'not_connected' ;\nHELLO 1 default ;\nMODULE-REPO cmi.cache\n"
    );
}

#[test]
fn error_responses_do_not_change_session_state() {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();

    // Disconnected: unknown verbs, premature requests, and a too-new
    // handshake all answer ERROR and leave the state alone.
    let too_new = format!("HELLO {} X Y\n", PROTOCOL_VERSION + 1);
    for batch in ["BOGUS\n", "MODULE-IMPORT foo\n", too_new.as_str()] {
        let (_, out) = run_batch(&mut server, &mut resolver, batch);
        assert!(out.starts_with("ERROR "), "got {out}");
        assert_eq!(server.state(), SessionState::Disconnected);
    }

    // Connected: same story.
    let (_, out) = run_batch(&mut server, &mut resolver, "HELLO 1 X Y\n");
    assert_eq!(out, "HELLO 1 default\n");
    for batch in ["BOGUS\n", "HELLO 1 X Y\n", "MODULE-EXPORT ''\n"] {
        let (_, out) = run_batch(&mut server, &mut resolver, batch);
        assert!(out.starts_with("ERROR "), "got {out}");
        assert_eq!(server.state(), SessionState::Connected);
    }
}

/// Session handler installed by the pivot below. Distinguishable from
/// the initial resolver by its repository answer, and hostile to a
/// second handshake.
struct Handler {
    inner: FileResolver,
}

impl Handler {
    fn new() -> Self {
        Self {
            inner: FileResolver::new(ResolverConfig::default().with_repo_dir("pivot.cache")),
        }
    }
}

impl Resolver for Handler {
    fn connect_request(
        &mut self,
        server: &mut MapperServer,
        _version: u32,
        _agent: &str,
        _ident: &str,
    ) -> Pivot {
        server.error_response("unexpected connect call");
        Pivot::Close
    }

    fn module_repo_request(&mut self, server: &mut MapperServer) {
        self.inner.module_repo_request(server);
    }

    fn module_export_request(&mut self, server: &mut MapperServer, module: &str) {
        self.inner.module_export_request(server, module);
    }

    fn module_import_request(&mut self, server: &mut MapperServer, module: &str) {
        self.inner.module_import_request(server, module);
    }

    fn include_translate_request(&mut self, server: &mut MapperServer, include: &str) {
        self.inner.include_translate_request(server, include);
    }
}

/// Listener-side resolver that hands the session to a [`Handler`] once
/// the handshake succeeds.
struct Initial {
    inner: FileResolver,
}

impl Resolver for Initial {
    fn connect_request(
        &mut self,
        server: &mut MapperServer,
        version: u32,
        agent: &str,
        ident: &str,
    ) -> Pivot {
        match self.inner.connect_request(server, version, agent, ident) {
            Pivot::Stay if server.is_connected() => Pivot::Swap(Box::new(Handler::new())),
            other => other,
        }
    }

    fn module_repo_request(&mut self, server: &mut MapperServer) {
        self.inner.module_repo_request(server);
    }

    fn module_export_request(&mut self, server: &mut MapperServer, module: &str) {
        self.inner.module_export_request(server, module);
    }

    fn module_import_request(&mut self, server: &mut MapperServer, module: &str) {
        self.inner.module_import_request(server, module);
    }

    fn include_translate_request(&mut self, server: &mut MapperServer, include: &str) {
        self.inner.include_translate_request(server, include);
    }
}

#[test]
fn pivot_takes_effect_within_the_same_batch() {
    let mut server = MapperServer::new();
    let mut initial = Initial {
        inner: FileResolver::default(),
    };

    let (outcome, out) = run_batch(
        &mut server,
        &mut initial,
        "HELLO 1 TEST IDENT ;\nMODULE-REPO ;\nHELLO 1 TEST IDENT\n",
    );

    // The repository question after the handshake already went to the
    // handler; the second handshake died at the server.
    assert_eq!(
        out,
        "HELLO 1 default ;\nMODULE-REPO pivot.cache ;\nERROR 'already_connected'\n"
    );

    let mut handler = match outcome {
        Dispatch::Pivoted(handler) => handler,
        _ => panic!("handshake should have pivoted"),
    };

    // Later batches keep flowing through the pivoted handler.
    let (outcome, out) = run_batch(&mut server, handler.as_mut(), "MODULE-REPO\n");
    assert_eq!(out, "MODULE-REPO pivot.cache\n");
    assert!(matches!(outcome, Dispatch::Retained));
}

#[test]
fn pivot_is_not_installed_when_the_handshake_fails() {
    let mut server = MapperServer::new();
    let mut initial = Initial {
        inner: FileResolver::default(),
    };

    let too_new = format!("HELLO {} TEST IDENT\n", PROTOCOL_VERSION + 1);
    let (outcome, out) = run_batch(&mut server, &mut initial, &too_new);
    assert_eq!(out, "ERROR 'version mismatch'\n");
    assert!(matches!(outcome, Dispatch::Retained));
    assert!(!server.is_connected());
}

#[test]
fn include_translate_against_a_real_repository() {
    let repo = tempfile::tempdir().expect("tempdir");
    std::fs::write(repo.path().join("foo.h.cmi"), b"fake cmi").expect("cmi file");
    // A directory under the canonical name must not count.
    std::fs::create_dir(repo.path().join("dir.h.cmi")).expect("decoy dir");

    let mut server = MapperServer::new();
    let mut resolver =
        FileResolver::new(ResolverConfig::default().with_repo_dir(repo.path()));

    let (_, out) = run_batch(
        &mut server,
        &mut resolver,
        "HELLO 1 TEST IDENT ;\n\
         INCLUDE-TRANSLATE foo.h ;\n\
         INCLUDE-TRANSLATE missing.h ;\n\
         INCLUDE-TRANSLATE dir.h\n",
    );

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        [
            "HELLO 1 default ;",
            "MODULE-CMI foo.h.cmi ;",
            "INCLUDE-TEXT ;",
            "INCLUDE-TEXT",
        ]
    );
}

#[test]
fn batch_responses_preserve_request_order() {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();

    let (_, out) = run_batch(
        &mut server,
        &mut resolver,
        "HELLO 1 A B ;\nMODULE-EXPORT m1 ;\nMODULE-IMPORT m2 ;\nMODULE-EXPORT m3 ;\nMODULE-IMPORT m4\n",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[1].contains("m1.cmi"));
    assert!(lines[2].contains("m2.cmi"));
    assert!(lines[3].contains("m3.cmi"));
    assert!(lines[4].contains("m4.cmi"));
}
