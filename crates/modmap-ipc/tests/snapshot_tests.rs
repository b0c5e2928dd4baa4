//! Snapshot tests locking in the response wire format.
//!
//! These exist to catch accidental protocol regressions: the exact
//! bytes matter to compilers on the other end.

use insta::assert_snapshot;

use modmap_ipc::prelude::*;

fn respond(batch: &str) -> String {
    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();
    server
        .accept_batch(batch.as_bytes().to_vec())
        .expect("batch loads");
    let _ = server.parse_requests(&mut resolver);
    server.prepare_to_write();
    String::from_utf8(server.take_response_batch()).expect("utf-8 responses")
}

#[test]
fn snapshot_mixed_batch() {
    let out = respond(
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
    assert_snapshot!(out.trim_end(), @r"
    HELLO 0 default ;
    MODULE-REPO cmi.cache ;
    MODULE-CMI bar.cmi ;
    MODULE-CMI foo.cmi ;
    ERROR 'unrecognized_request NOT A COMMAND' ;
    INCLUDE-TEXT ;
    INCLUDE-TEXT ;
    OK ;
    ERROR 'malformed_request MODULE-IMPORT \'\''
    ");
}

#[test]
fn snapshot_handshake_ordering() {
    let out = respond("MODULE-REPO ;\nHELLO 1 X Y ;\nMODULE-REPO\n");
    assert_snapshot!(out.trim_end(), @r"
    ERROR 'not_connected' ;
    HELLO 1 default ;
    MODULE-REPO cmi.cache
    ");
}

#[test]
fn snapshot_quoted_module_names() {
    let out = respond("HELLO 1 X Y ;\nMODULE-IMPORT 'needs quoting' ;\nMODULE-IMPORT foo:part\n");
    assert_snapshot!(out.trim_end(), @r"
    HELLO 1 default ;
    MODULE-CMI 'needs quoting.cmi' ;
    MODULE-CMI foo-part.cmi
    ");
}
