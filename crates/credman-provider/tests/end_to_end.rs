//! End-to-end request handling through the manager and the default
//! provider registry, with an in-memory store and scripted prompts.

use credman_config::{MemoryConfigSource, Settings};
use credman_core::cancel::CancellationToken;
use credman_core::store::{MemoryStore, SecretStore};
use credman_core::{
    read_request, write_response, CoreError, Credential, CredentialManager, DisabledPrompter,
    Prompter, ProviderContext, Request, ScriptedPrompter,
};
use credman_provider::{create_default_registry, AzureReposCache};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

struct Fixture {
    manager: CredentialManager,
    store: Arc<MemoryStore>,
    cache: Arc<AzureReposCache>,
    _cache_dir: TempDir,
}

fn fixture_with(prompter: Arc<dyn Prompter>, env: Vec<(&str, &str)>) -> Fixture {
    let settings = Arc::new(Settings::with_environment(
        Box::new(MemoryConfigSource::default()),
        env.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    ));

    let store = Arc::new(MemoryStore::new());
    let cache_dir = TempDir::new().unwrap();
    let cache = Arc::new(AzureReposCache::new(cache_dir.path().join("azrepos.ini")));

    let context = ProviderContext {
        settings: settings.clone(),
        store: store.clone(),
        prompter,
        http: reqwest::Client::new(),
        cancel: CancellationToken::never(),
    };

    let registry = create_default_registry(&context, cache.clone());
    Fixture {
        manager: CredentialManager::new(registry, settings),
        store,
        cache,
        _cache_dir: cache_dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(DisabledPrompter), vec![])
}

fn parse(input: &str) -> Request {
    read_request(&mut Cursor::new(input.as_bytes())).unwrap()
}

#[tokio::test]
async fn test_github_get_serves_stored_credential_verbatim() {
    let f = fixture();
    f.store
        .add_or_update("git:https://github.com", &Credential::new("alice", "s3cret"))
        .unwrap();

    let request = parse("protocol=https\nhost=github.com\n\n");
    let credential = f.manager.get(&request).await.unwrap().unwrap();

    let mut out = Vec::new();
    write_response(&mut out, &request, &credential).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "protocol=https\nhost=github.com\nusername=alice\npassword=s3cret\n\n"
    );
}

#[tokio::test]
async fn test_azure_rejects_unencrypted_http() {
    let f = fixture();
    let request = parse("protocol=http\nhost=dev.azure.com\npath=contoso/_git/widgets\n\n");

    let err = f.manager.get(&request).await.unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedProtocol(_)));
    assert_eq!(
        err.to_string(),
        "Unencrypted HTTP is not supported for Azure Repos"
    );
}

#[tokio::test]
async fn test_explicitly_signed_out_remote_requires_fresh_signin() {
    // Pre-state: an org-level user plus the empty-string marker at remote
    // scope. The marker wins, so the provider must start a fresh sign-in
    // rather than reuse the org user; with interactivity off that surfaces
    // as InteractionDisabled before any network traffic.
    let f = fixture_with(
        Arc::new(DisabledPrompter),
        vec![("GCM_INTERACTIVE", "false")],
    );
    let remote = Url::parse("https://dev.azure.com/contoso/_git/widgets").unwrap();
    f.cache.sign_in_org("contoso", "alice@contoso.com").unwrap();
    f.cache.sign_out_remote(&remote, true).unwrap();
    // A cached authority keeps the provider off the network
    f.cache
        .update_authority("contoso", "https://login.microsoftonline.com/T1")
        .unwrap();

    let request = parse("protocol=https\nhost=dev.azure.com\npath=contoso/_git/widgets\n\n");
    let err = f.manager.get(&request).await.unwrap_err();
    assert!(matches!(err, CoreError::InteractionDisabled));
}

#[tokio::test]
async fn test_azure_store_and_erase_update_cache_and_store() {
    let f = fixture();
    let remote = Url::parse("https://dev.azure.com/contoso/_git/widgets").unwrap();
    f.cache
        .update_authority("contoso", "https://login.microsoftonline.com/T1")
        .unwrap();

    let store_request = parse(
        "protocol=https\nhost=dev.azure.com\npath=contoso/_git/widgets\n\
         username=alice@contoso.com\npassword=token123\n\n",
    );
    f.manager.store(&store_request).await.unwrap();

    // First sign-in lands at organization scope
    assert_eq!(
        f.cache.get_org_user("contoso").as_deref(),
        Some("alice@contoso.com")
    );
    assert!(f
        .store
        .get("git:https://dev.azure.com", Some("alice@contoso.com"))
        .unwrap()
        .is_some());

    let erase_request = parse(
        "protocol=https\nhost=dev.azure.com\npath=contoso/_git/widgets\n\
         username=alice@contoso.com\npassword=token123\n\n",
    );
    f.manager.erase(&erase_request).await.unwrap();

    // The credential is gone, the remote is explicitly signed out, and the
    // possibly-stale authority was dropped with it
    assert!(f
        .store
        .get("git:https://dev.azure.com", None)
        .unwrap()
        .is_none());
    assert_eq!(f.cache.get_remote_user(&remote).as_deref(), Some(""));
    assert_eq!(f.cache.get_authority("contoso"), None);
}

#[tokio::test]
async fn test_erase_then_get_prompts_again() {
    let prompter = Arc::new(ScriptedPrompter::with_basic("alice", "fresh-secret"));
    let f = fixture_with(prompter, vec![]);

    f.store
        .add_or_update("git:https://example.com", &Credential::new("alice", "stale"))
        .unwrap();

    let erase = parse("protocol=https\nhost=example.com\nusername=alice\npassword=stale\n\n");
    f.manager.erase(&erase).await.unwrap();

    let get = parse("protocol=https\nhost=example.com\n\n");
    let credential = f.manager.get(&get).await.unwrap().unwrap();
    assert_eq!(credential.secret(), "fresh-secret");
}

#[tokio::test]
async fn test_two_stores_keep_only_second_secret() {
    let f = fixture();
    let first = parse("protocol=https\nhost=example.com\nusername=alice\npassword=one\n\n");
    let second = parse("protocol=https\nhost=example.com\nusername=alice\npassword=two\n\n");
    f.manager.store(&first).await.unwrap();
    f.manager.store(&second).await.unwrap();

    let stored = f
        .store
        .get("git:https://example.com", Some("alice"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.secret(), "two");
    assert_eq!(f.store.list("git:").unwrap().len(), 1);
}

#[tokio::test]
async fn test_gist_and_github_share_a_storage_key() {
    let f = fixture();
    let store_request = parse(
        "protocol=https\nhost=gist.github.com\nusername=alice\npassword=tok\n\n",
    );
    f.manager.store(&store_request).await.unwrap();

    let get_request = parse("protocol=https\nhost=github.com\n\n");
    let credential = f.manager.get(&get_request).await.unwrap().unwrap();
    assert_eq!(credential.account(), "alice");
    assert_eq!(credential.secret(), "tok");
}

#[tokio::test]
async fn test_generic_prompt_on_miss() {
    let prompter = Arc::new(ScriptedPrompter::with_basic("bob", "hunter2"));
    let f = fixture_with(prompter, vec![]);

    let request = parse("protocol=https\nhost=selfhosted.example.com\n\n");
    let credential = f.manager.get(&request).await.unwrap().unwrap();
    assert_eq!(credential.account(), "bob");
    assert_eq!(credential.secret(), "hunter2");
}

#[tokio::test]
async fn test_interaction_disabled_surfaces_specific_error() {
    let f = fixture_with(
        Arc::new(DisabledPrompter),
        vec![("GCM_INTERACTIVE", "false")],
    );
    let request = parse("protocol=https\nhost=selfhosted.example.com\n\n");
    let err = f.manager.get(&request).await.unwrap_err();
    assert!(matches!(err, CoreError::InteractionDisabled));
}

#[tokio::test]
async fn test_forced_provider_override_wins() {
    // A GitHub remote forced onto the generic provider prompts instead of
    // running GitHub authentication.
    let prompter = Arc::new(ScriptedPrompter::with_basic("carol", "pw"));
    let f = fixture_with(prompter, vec![("GCM_PROVIDER", "generic")]);

    let request = parse("protocol=https\nhost=github.com\n\n");
    let credential = f.manager.get(&request).await.unwrap().unwrap();
    assert_eq!(credential.account(), "carol");
}

#[tokio::test]
async fn test_namespace_scopes_storage_keys() {
    let f = fixture_with(Arc::new(DisabledPrompter), vec![("GCM_NAMESPACE", "work")]);
    let store_request =
        parse("protocol=https\nhost=example.com\nusername=alice\npassword=pw\n\n");
    f.manager.store(&store_request).await.unwrap();

    assert!(f.store.get("work:https://example.com", None).unwrap().is_some());
    assert!(f.store.get("git:https://example.com", None).unwrap().is_none());
}
