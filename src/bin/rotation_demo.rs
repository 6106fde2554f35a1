/// Walkthrough of the rotation engine against a live Redis.
///
/// ⚠️ Required for execution: a reachable Redis matching `settings/dev.toml`,
/// e.g.
///
/// ```text
/// docker run --rm -p 6379:6379 redis:7
/// cargo run --bin rotation_demo
/// ```
///
/// Every run uses a fresh key prefix, so repeated runs do not interfere.
use futures_util::future::join_all;
use nanoid::nanoid;
use std::sync::Arc;
use std::time::Duration;
use tessera::application_impl::{FakeUserDirectory, JwtConfig, JwtHs256Codec, RealAuthService};
use tessera::application_port::{AuthService, LoginInput, TokenCodec};
use tessera::domain_port::{SessionStore, UserDirectory};
use tessera::infra_redis::RedisSessionStore;
use tessera::settings::parse_settings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const EMAIL: &str = "demo@example.com";
const PASSWORD: &str = "demo-password";
const AGENT_DESKTOP: &str = "demo-desktop";
const AGENT_PHONE: &str = "demo-phone";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::new("rotation_demo=debug,tessera=debug");

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let settings = parse_settings(None)?;

    let alphabet: [char; 16] = [
        '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
    ];
    let run_id = nanoid!(10, &alphabet);

    // region prepare connection

    let redis_client = redis::Client::open(settings.redis.url.as_str())?;
    let mut redis_manager = redis_client.get_connection_manager().await?;

    let pong: String = redis::cmd("PING").query_async(&mut redis_manager).await?;
    println!("PING -> {}", pong);

    // endregion

    // region initialization

    let refresh_ttl = Duration::from_secs(settings.token.refresh_ttl_secs);
    let session_store: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
        redis_manager.clone(),
        format!("{}:{}", settings.redis.key_prefix, run_id),
        refresh_ttl,
    ));

    let key = std::env::var(&settings.token.signing_key_env)
        .unwrap_or_else(|_| "my-dev-secret-key".to_string())
        .into_bytes();
    let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
        issuer: settings.token.issuer.clone(),
        audience: settings.token.audience.clone(),
        access_ttl: Duration::from_secs(settings.token.access_ttl_secs),
        refresh_ttl,
        signing_key: key,
    }));

    let directory = Arc::new(FakeUserDirectory::new());
    directory.add_user(EMAIL, PASSWORD);
    let user_directory: Arc<dyn UserDirectory> = directory;

    let auth_service = Arc::new(RealAuthService::new(
        user_directory,
        token_codec,
        session_store,
    ));

    // endregion

    // use cases

    let login = |agent: &str| LoginInput {
        email: EMAIL.to_string(),
        password: PASSWORD.to_string(),
        user_agent: agent.to_string(),
    };

    let desktop = auth_service.login(login(AGENT_DESKTOP)).await?;
    tracing::debug!("desktop login: {:?}", desktop.user_id);

    let verified = auth_service
        .verify_token(&desktop.tokens.access_token.0)
        .await?;
    tracing::debug!("access token verified: {}", verified);

    let rotated = auth_service
        .refresh(&desktop.tokens.refresh_token.0, AGENT_DESKTOP)
        .await?;
    tracing::info!("rotation succeeded");

    // Replay of the rotated-away token: rejected, and the whole family is
    // revoked, so the newest token dies with it.
    let replay = auth_service
        .refresh(&desktop.tokens.refresh_token.0, AGENT_DESKTOP)
        .await;
    tracing::info!("replay attempt: {:?}", replay.err());
    let newest = auth_service
        .refresh(&rotated.refresh_token.0, AGENT_DESKTOP)
        .await;
    tracing::info!("newest token after replay: {:?}", newest.err());

    // Concurrent redeems of one token: a single winner.
    let phone = auth_service.login(login(AGENT_PHONE)).await?;
    let token = phone.tokens.refresh_token.0.clone();
    let attempts = join_all((0..4).map(|_| {
        let auth_service = auth_service.clone();
        let token = token.clone();
        async move { auth_service.refresh(&token, AGENT_PHONE).await.is_ok() }
    }))
    .await;
    let winners = attempts.iter().filter(|ok| **ok).count();
    tracing::info!("concurrent redeems: {} of {} won", winners, attempts.len());

    // Session management.
    let laptop = auth_service.login(login(AGENT_DESKTOP)).await?;
    let tablet = auth_service.login(login(AGENT_PHONE)).await?;
    let sessions = auth_service.list_sessions(laptop.user_id).await?;
    for session in &sessions {
        tracing::info!(
            "session {} agent={} last_active={}",
            session.family_id,
            session.user_agent,
            session.last_active
        );
    }

    auth_service
        .block_session(laptop.user_id, sessions[0].family_id)
        .await?;
    let remaining = auth_service.block_all_sessions(laptop.user_id).await?;
    tracing::info!("blocked {} remaining sessions", remaining);

    // Logout is best-effort and idempotent.
    auth_service
        .logout(Some(&tablet.tokens.refresh_token.0))
        .await;
    auth_service
        .logout(Some(&tablet.tokens.refresh_token.0))
        .await;
    auth_service.logout(None).await;

    Ok(())
}
