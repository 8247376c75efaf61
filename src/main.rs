use passgate::application_port::*;
use passgate::bootstrap::*;
use passgate::logger::*;
use passgate::settings::*;
use serde::Serialize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    if project_settings.store.backend == "memory" && cli.command.reads_earlier_runs() {
        warn!("memory store backend keeps no state between runs; use `demo` or the mysql backend");
    }

    let core = AuthCore::try_new(&project_settings).await?;
    let result = run(&core, cli.command).await;
    core.shutdown().await;
    result
}

async fn run(core: &AuthCore, command: Command) -> anyhow::Result<()> {
    let service = core.account_service.as_ref();
    match command {
        Command::Register {
            user_name,
            password,
            nickname,
            email,
        } => {
            let id = service
                .register(RegisterInput {
                    user_name,
                    password,
                    nickname,
                    email,
                })
                .await?;
            print_json(&serde_json::json!({ "id": id }))
        }
        Command::Login {
            user_name,
            password,
        } => {
            let tokens = service
                .login(LoginInput {
                    user_name,
                    password,
                })
                .await?;
            print_json(&tokens)
        }
        Command::Validate { user_name, token } => {
            let state = service.validate_access_token(&user_name, &token).await?;
            print_json(&serde_json::json!({
                "state": state,
                "accepted": state.is_accepted(),
            }))
        }
        Command::Rotate {
            user_name,
            refresh_token,
        } => {
            let access_token = service
                .rotate_access_token(&user_name, &refresh_token)
                .await?;
            print_json(&serde_json::json!({ "access_token": access_token }))
        }
        Command::Session {
            user_name,
            session_token,
        } => {
            let valid = service.validate_session(&user_name, &session_token).await;
            print_json(&serde_json::json!({ "valid": valid }))
        }
        Command::Revoke { user_name } => {
            service.revoke_account(&user_name).await?;
            print_json(&serde_json::json!({ "revoked": user_name }))
        }
        Command::Profile { user_name } => {
            let profile = service.get_public_profile(&user_name).await?;
            print_json(&profile)
        }
        Command::Demo {
            user_name,
            password,
        } => demo(service, &user_name, &password).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn demo(
    service: &dyn AccountService,
    user_name: &str,
    password: &str,
) -> anyhow::Result<()> {
    match service
        .register(RegisterInput {
            user_name: user_name.to_string(),
            password: password.to_string(),
            ..Default::default()
        })
        .await
    {
        Ok(id) => info!(%id, "registered"),
        Err(AccountError::AccountExists) => info!("account exists, reusing it"),
        Err(e) => return Err(e.into()),
    }

    let login = service
        .login(LoginInput {
            user_name: user_name.to_string(),
            password: password.to_string(),
        })
        .await?;
    let first = login.access_token.0.clone();

    let mut steps = Vec::new();
    let state = service.validate_access_token(user_name, &first).await?;
    steps.push(("first token", state));

    let second = service
        .rotate_access_token(user_name, &login.refresh_token.0)
        .await?
        .0;
    let state = service.validate_access_token(user_name, &first).await?;
    steps.push(("first token after rotation", state));
    let state = service.validate_access_token(user_name, &second).await?;
    steps.push(("second token", state));
    let state = service.validate_access_token(user_name, "garbage").await?;
    steps.push(("garbage token", state));

    service.revoke_account(user_name).await?;
    let state = service.validate_access_token(user_name, &second).await?;
    steps.push(("second token after revoke", state));

    for (step, state) in &steps {
        println!("{step:<40} {state:?}");
    }
    println!(
        "{:<40} {}",
        "session after revoke",
        service
            .validate_session(user_name, &login.session_token.0)
            .await
    );
    Ok(())
}
