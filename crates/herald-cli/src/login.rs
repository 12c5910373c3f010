//! The `login` subcommand.
//!
//! Three paths, matching what the configured transport supports:
//! `--token` for token identities, `--identity` / `--code` /
//! `--second-factor` for transports that issue login codes, and no
//! arguments to probe the stored identity.

use clap::Args;

use herald_broadcast::Store;
use herald_core::config::HeraldConfig;
use herald_transport::TransportError;

use crate::{await_handle, spawn_transport, CONNECT_TIMEOUT};

#[derive(Args)]
pub struct LoginArgs {
    /// Bot token to authenticate with (stored for later runs).
    #[arg(long)]
    token: Option<String>,

    /// Identity (e.g. phone number) for transports that issue login codes.
    #[arg(long, conflicts_with = "token")]
    identity: Option<String>,

    /// Login code received out of band.
    #[arg(long, conflicts_with = "token")]
    code: Option<String>,

    /// Second factor, when the account requires one.
    #[arg(long, requires = "code")]
    second_factor: Option<String>,
}

pub async fn run(config: &HeraldConfig, store: &Store, args: LoginArgs) -> anyhow::Result<()> {
    let facade = spawn_transport(config)?;

    if let Some(token) = args.token {
        await_handle(facade.connect(Some(token.clone())), CONNECT_TIMEOUT, "connect").await?;
        store.set_setting("identity", &token)?;
        println!("connected and authorized; identity stored");
        return Ok(());
    }

    if let Some(code) = args.code {
        let result = await_handle(
            facade.complete_login(code, args.second_factor),
            CONNECT_TIMEOUT,
            "login",
        )
        .await;
        return match result {
            Ok(()) => {
                println!("logged in");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.downcast_ref::<TransportError>(),
                    Some(TransportError::AuthChallenge)
                ) =>
            {
                anyhow::bail!("second factor required — re-run with --second-factor")
            }
            Err(e) => Err(e),
        };
    }

    if let Some(identity) = args.identity {
        await_handle(
            facade.request_login_code(identity.clone()),
            CONNECT_TIMEOUT,
            "login code request",
        )
        .await?;
        store.set_setting("identity", &identity)?;
        println!("login code requested — complete with `herald login --code <code>`");
        return Ok(());
    }

    // No explicit credentials: probe whatever identity is stored/configured.
    await_handle(
        facade.connect(store.get_setting("identity")?),
        CONNECT_TIMEOUT,
        "connect",
    )
    .await?;
    let authorized =
        await_handle(facade.is_authorized(), CONNECT_TIMEOUT, "authorization check").await?;
    if authorized {
        println!("authorized");
    } else {
        println!("not authorized — supply --token or --identity");
    }
    Ok(())
}
