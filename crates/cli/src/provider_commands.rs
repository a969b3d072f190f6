use {
    anyhow::{Result, bail},
    chatdesk_common::ProviderId,
    chatdesk_provider_setup::{
        CredentialsPatch, Provider, ProviderConsole, ProviderStatus, TestResult,
    },
    clap::{Args, Subcommand},
};

#[derive(Subcommand)]
pub enum ProviderAction {
    /// List providers known to the backend.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Test credentials without saving them.
    Test {
        /// Provider id (e.g. "openai").
        provider: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Test, save and discover models in one go.
    Connect {
        /// Provider id (e.g. "openai").
        provider: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Re-fetch the model catalog of a saved provider.
    Refresh {
        /// Provider id.
        provider: String,
    },
}

#[derive(Args)]
pub struct CredentialArgs {
    /// API key. Prefer the environment variable over the flag.
    #[arg(long, env = "CHATDESK_PROVIDER_API_KEY", hide_env_values = true)]
    api_key: String,
    /// Custom API base URL.
    #[arg(long)]
    base_url: Option<String>,
    /// Provider region.
    #[arg(long)]
    region: Option<String>,
}

impl From<CredentialArgs> for CredentialsPatch {
    fn from(args: CredentialArgs) -> Self {
        Self {
            api_key: Some(args.api_key),
            base_url: args.base_url,
            region: args.region,
        }
    }
}

pub async fn handle_providers(console: &ProviderConsole, action: ProviderAction) -> Result<()> {
    match action {
        ProviderAction::List { json } => list(console, json),
        ProviderAction::Test {
            provider,
            credentials,
        } => {
            let id = ProviderId::from(provider);
            let result = run_test(console, &id, credentials.into()).await?;
            if !result.success {
                bail!("connection test failed");
            }
            Ok(())
        },
        ProviderAction::Connect {
            provider,
            credentials,
        } => connect(console, ProviderId::from(provider), credentials.into()).await,
        ProviderAction::Refresh { provider } => {
            let id = ProviderId::from(provider);
            let catalog = console.fetch_models(&id).await?;
            let summary = catalog.summary();
            println!(
                "{id}: {} models ({} saved, {} active)",
                summary.total, summary.saved, summary.active
            );
            Ok(())
        },
    }
}

fn list(console: &ProviderConsole, json: bool) -> Result<()> {
    let providers = console.providers();
    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }
    if providers.is_empty() {
        println!("No providers.");
        return Ok(());
    }
    for line in provider_lines(&providers) {
        println!("{line}");
    }
    Ok(())
}

fn provider_lines(providers: &[Provider]) -> Vec<String> {
    let width = providers
        .iter()
        .map(|p| p.id.as_str().len())
        .max()
        .unwrap_or(0);
    providers
        .iter()
        .map(|p| {
            let models = if p.persisted {
                format!("{} models", p.model_count)
            } else {
                "not saved".to_string()
            };
            format!(
                "  {:<width$}  {:<16}  {:<20}  {models}",
                p.id.as_str(),
                p.status.to_string(),
                p.name
            )
        })
        .collect()
}

/// Register the provider if the backend didn't list it, enter credentials
/// and run the connectivity test.
async fn run_test(
    console: &ProviderConsole,
    id: &ProviderId,
    patch: CredentialsPatch,
) -> Result<TestResult> {
    if console.provider(id).is_err() {
        console.insert_provider(id.clone(), id.as_str())?;
    }
    console.enter_credentials(id, &patch).await?;
    let result = console.test_connection(id).await?;
    print_test_result(id, &result);
    Ok(result)
}

fn print_test_result(id: &ProviderId, result: &TestResult) {
    let verdict = if result.success { "ok" } else { "FAILED" };
    match result.latency_ms {
        Some(ms) => println!("{id}: {verdict} ({ms} ms) {}", result.message),
        None => println!("{id}: {verdict} {}", result.message),
    }
}

async fn connect(console: &ProviderConsole, id: ProviderId, patch: CredentialsPatch) -> Result<()> {
    let result = run_test(console, &id, patch).await?;
    if !result.success {
        bail!("connection test failed; credentials not saved");
    }

    match console.save_provider(&id).await? {
        ProviderStatus::Ready => {
            let summary = console.summary(&id)?;
            println!(
                "{id}: saved, {} models discovered ({} saved, {} active)",
                summary.total, summary.saved, summary.active
            );
            Ok(())
        },
        status => {
            let provider = console.provider(&id)?;
            bail!(
                "{id}: saved, but ended in {status}: {}",
                provider.last_error.unwrap_or_default()
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_lines_align_ids() {
        let mut saved = Provider::new("openai", "OpenAI");
        saved.persisted = true;
        saved.model_count = 12;
        saved.status = ProviderStatus::Ready;
        let fresh = Provider::new("mistral-eu", "Mistral");

        let lines = provider_lines(&[saved, fresh]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  openai      ready"));
        assert!(lines[0].ends_with("12 models"));
        assert!(lines[1].ends_with("not saved"));
    }

    #[test]
    fn credential_args_become_a_full_patch() {
        let patch = CredentialsPatch::from(CredentialArgs {
            api_key: "sk-1".into(),
            base_url: None,
            region: Some("eu".into()),
        });
        assert_eq!(patch.api_key.as_deref(), Some("sk-1"));
        assert!(patch.base_url.is_none());
        assert_eq!(patch.region.as_deref(), Some("eu"));
    }
}
