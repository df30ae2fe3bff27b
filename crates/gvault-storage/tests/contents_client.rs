//! ContentsClient against a mock content API

use std::time::Duration;

use gvault_core::{EntryKind, VaultError};
use gvault_storage::{verify_repository, ClientSettings, ContentsClient, ObjectStore, WriteCondition};
use mockito::Matcher;
use secrecy::SecretString;
use serde_json::json;

fn client(server: &mockito::ServerGuard) -> ContentsClient {
    client_with_limit(server, 1024 * 1024)
}

fn client_with_limit(server: &mockito::ServerGuard, max_object_bytes: u64) -> ContentsClient {
    ContentsClient::new(
        ClientSettings {
            api_url: server.url(),
            owner: "acme".into(),
            repo: "vault".into(),
            branch: "main".into(),
            timeout: Duration::from_secs(5),
            max_object_bytes,
            user_agent: "gvault-test".into(),
        },
        SecretString::from("ghp_test"),
    )
    .unwrap()
}

/// Path matcher that tolerates a query string.
fn contents_path(path: &str) -> Matcher {
    Matcher::Regex(format!(
        r"^/repos/acme/vault/contents/{}(\?.*)?$",
        regex_escape(path)
    ))
}

fn regex_escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                vec!['\\', c]
            }
            _ => vec![c],
        })
        .collect()
}

fn file_json(path: &str, sha: &str, content_b64: &str, size: u64) -> String {
    json!({
        "type": "file",
        "name": path.rsplit('/').next().unwrap(),
        "path": path,
        "sha": sha,
        "size": size,
        "content": content_b64,
        "encoding": "base64",
    })
    .to_string()
}

#[tokio::test]
async fn test_get_decodes_wrapped_base64() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", contents_path("files/1_a.txt"))
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .match_header("authorization", "Bearer ghp_test")
        .match_header("accept", "application/vnd.github+json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_json("files/1_a.txt", "sha-1", "aGVs\nbG8=\n", 5))
        .create_async()
        .await;

    let obj = client(&server).get("files/1_a.txt").await.unwrap().unwrap();
    assert_eq!(obj.content, b"hello");
    assert_eq!(obj.revision, "sha-1");
    assert_eq!(obj.name(), "1_a.txt");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_missing_is_none() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", contents_path("metadata.json"))
        .with_status(404)
        .with_body(json!({"message": "Not Found"}).to_string())
        .create_async()
        .await;

    assert!(client(&server).get("metadata.json").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_large_object_falls_back_to_blob() {
    let mut server = mockito::Server::new_async().await;
    let _contents = server
        .mock("GET", contents_path("files/big.bin"))
        .with_status(200)
        .with_body(
            json!({
                "type": "file",
                "name": "big.bin",
                "path": "files/big.bin",
                "sha": "blobsha",
                "size": 3,
                "content": "",
                "encoding": "none",
            })
            .to_string(),
        )
        .create_async()
        .await;
    let blob = server
        .mock("GET", "/repos/acme/vault/git/blobs/blobsha")
        .with_status(200)
        .with_body(json!({"content": "AQID", "encoding": "base64", "sha": "blobsha"}).to_string())
        .create_async()
        .await;

    let obj = client(&server).get("files/big.bin").await.unwrap().unwrap();
    assert_eq!(obj.content, vec![1, 2, 3]);
    blob.assert_async().await;
}

#[tokio::test]
async fn test_list_maps_entries_and_skips_links() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", contents_path("files"))
        .with_status(200)
        .with_body(
            json!([
                {"type": "file", "name": "1_a.txt", "path": "files/1_a.txt", "sha": "s1", "size": 10},
                {"type": "dir", "name": "sub", "path": "files/sub", "sha": "s2", "size": 0},
                {"type": "symlink", "name": "l", "path": "files/l", "sha": "s3", "size": 4},
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let entries = client(&server).list("files").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[0].size, 10);
    assert_eq!(entries[1].kind, EntryKind::Dir);
}

#[tokio::test]
async fn test_list_missing_directory_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", contents_path("files"))
        .with_status(404)
        .create_async()
        .await;

    assert!(client(&server).list("files").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_put_with_token_sends_sha_and_branch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/repos/acme/vault/contents/metadata.json")
        .match_body(Matcher::PartialJson(json!({
            "content": "W10=",
            "branch": "main",
            "sha": "old-sha",
        })))
        .with_status(200)
        .with_body(json!({"content": {"type": "file", "name": "metadata.json", "path": "metadata.json", "sha": "new-sha", "size": 2}}).to_string())
        .create_async()
        .await;

    let written = client(&server)
        .put(
            "metadata.json",
            b"[]".to_vec(),
            "Update metadata",
            WriteCondition::Matches("old-sha".into()),
        )
        .await
        .unwrap();
    assert_eq!(written.revision, "new-sha");
    assert_eq!(written.content, b"[]");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_put_stale_token_is_conflict() {
    for status in [409, 422] {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/repos/acme/vault/contents/metadata.json")
            .with_status(status)
            .with_body(json!({"message": "metadata.json does not match old-sha"}).to_string())
            .create_async()
            .await;

        let err = client(&server)
            .put("metadata.json", b"[]".to_vec(), "m", WriteCondition::Matches("old-sha".into()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, VaultError::Conflict { .. }),
            "status {status} should map to conflict, got {err}"
        );
    }
}

#[tokio::test]
async fn test_put_validation_failure_is_not_conflict() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("PUT", "/repos/acme/vault/contents/files/1_a.txt")
        .with_status(422)
        .with_body(json!({"message": "Invalid request. content is not valid Base64"}).to_string())
        .create_async()
        .await;

    let err = client(&server)
        .put("files/1_a.txt", b"a".to_vec(), "m", WriteCondition::CreateNew)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Remote { status: 422, .. }), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_revision_lookup_skips_blob_fetch() {
    let mut server = mockito::Server::new_async().await;
    let _contents = server
        .mock("GET", contents_path("files/big.bin"))
        .with_status(200)
        .with_body(
            json!({
                "type": "file",
                "name": "big.bin",
                "path": "files/big.bin",
                "sha": "blobsha",
                "size": 3_000_000,
                "content": "",
                "encoding": "none",
            })
            .to_string(),
        )
        .create_async()
        .await;
    let blob = server
        .mock("GET", Matcher::Regex("^/repos/acme/vault/git/blobs/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let rev = client(&server).revision("files/big.bin").await.unwrap();
    assert_eq!(rev.as_deref(), Some("blobsha"));
    blob.assert_async().await;
}

#[tokio::test]
async fn test_overwrite_looks_up_current_sha() {
    let mut server = mockito::Server::new_async().await;
    let lookup = server
        .mock("GET", contents_path("notes.txt"))
        .with_status(200)
        .with_body(file_json("notes.txt", "cur-sha", "eA==", 1))
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/repos/acme/vault/contents/notes.txt")
        .match_body(Matcher::PartialJson(json!({"sha": "cur-sha"})))
        .with_status(200)
        .with_body(json!({"content": {"type": "file", "name": "notes.txt", "path": "notes.txt", "sha": "next", "size": 1}}).to_string())
        .create_async()
        .await;

    client(&server)
        .put("notes.txt", b"y".to_vec(), "m", WriteCondition::Overwrite)
        .await
        .unwrap();
    lookup.assert_async().await;
    put.assert_async().await;
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (401, "auth"),
        (403, "auth"),
        (500, "transient"),
        (503, "transient"),
        (429, "transient"),
        (400, "remote"),
    ];
    for (status, expected) in cases {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", contents_path("x"))
            .with_status(status)
            .with_body(json!({"message": "nope"}).to_string())
            .create_async()
            .await;

        let err = client(&server).get("x").await.unwrap_err();
        let ok = match expected {
            "auth" => matches!(err, VaultError::Authorization(_)),
            "transient" => err.is_transient(),
            _ => matches!(err, VaultError::Remote { .. }),
        };
        assert!(ok, "status {status}: unexpected {err:?}");
    }
}

#[tokio::test]
async fn test_too_large_rejected_without_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = client_with_limit(&server, 4)
        .put("files/big", vec![0; 5], "m", WriteCondition::CreateNew)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::TooLarge { size: 5, limit: 4, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_sends_expected_revision() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/repos/acme/vault/contents/files/1_a.txt")
        .match_body(Matcher::PartialJson(json!({"sha": "s1", "branch": "main"})))
        .with_status(200)
        .with_body(json!({"content": null}).to_string())
        .create_async()
        .await;

    client(&server)
        .delete("files/1_a.txt", "Delete file", "s1")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_verify_repository_requires_push() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/repos/acme/vault")
        .with_status(200)
        .with_body(
            json!({
                "full_name": "acme/vault",
                "private": true,
                "default_branch": "main",
                "permissions": {"pull": true, "push": false},
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = verify_repository(&client(&server)).await.unwrap_err();
    assert!(matches!(err, VaultError::Authorization(_)));
}

#[tokio::test]
async fn test_verify_repository_ok() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/repos/acme/vault")
        .with_status(200)
        .with_body(
            json!({
                "full_name": "acme/vault",
                "default_branch": "main",
                "permissions": {"pull": true, "push": true},
            })
            .to_string(),
        )
        .create_async()
        .await;

    let info = verify_repository(&client(&server)).await.unwrap();
    assert_eq!(info.full_name, "acme/vault");
}
