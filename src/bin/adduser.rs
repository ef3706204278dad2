//! adduser - create a Pennywise account from the command line
//!
//! ```text
//! adduser --user alice [--password secret] [--db data/expenses.db]
//! ```

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Password};

use pennywise::{
    config::{default_database_url, DatabaseConfig},
    db::{
        self,
        repositories::{SqlxExpenseRepository, SqlxSessionRepository, SqlxUserRepository},
    },
    models::User,
    services::{SessionService, UserService, UserServiceError},
};

#[derive(Parser, Debug)]
#[command(name = "adduser")]
#[command(about = "Create a Pennywise user")]
struct Cli {
    /// Username for the new account
    #[arg(long)]
    user: String,

    /// Password (prompted for when omitted)
    #[arg(long)]
    password: Option<String>,

    /// Database path or URL; `mysql://` selects MySQL
    #[arg(long, env = "PENNYWISE_DATABASE_URL", default_value_t = default_database_url())]
    db: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pennywise=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let password = match cli.password.clone() {
        Some(password) => password,
        None if std::io::stdin().is_terminal() => prompt_password()?,
        None => read_password_line(&mut std::io::stdin().lock())?,
    };

    run(&cli, &password, &mut std::io::stdout()).await?;
    Ok(())
}

fn prompt_password() -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("Failed to read password")
}

/// Read one line of piped input as the password.
fn read_password_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run(cli: &Cli, password: &str, out: &mut impl Write) -> Result<User> {
    if password.trim().is_empty() {
        bail!("password cannot be empty");
    }

    let pool = db::create_pool(&DatabaseConfig::from_url(cli.db.as_str())).await?;
    db::migrations::run_migrations(&pool).await?;

    let sessions = Arc::new(SessionService::new(SqlxSessionRepository::boxed(
        pool.clone(),
    )));
    let users = UserService::new(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxExpenseRepository::boxed(pool),
        sessions,
    );

    let user = match users.create_user(&cli.user, password).await {
        Ok(user) => user,
        Err(UserServiceError::UserExists(name)) => bail!("user {} already exists", name),
        Err(e) => return Err(e.into()),
    };

    writeln!(
        out,
        "User {} created successfully with ID {}",
        user.username, user.id
    )?;
    Ok(user)
}
