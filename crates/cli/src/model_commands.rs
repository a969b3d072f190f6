use {
    anyhow::Result,
    chatdesk_common::{ModelId, ProviderId},
    chatdesk_provider_setup::{BulkAction, BulkOutcome, ModelQuery, ProviderConsole, ProviderModel},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum ModelAction {
    /// List a provider's models.
    List {
        /// Provider id.
        provider: String,
        /// Only this model family.
        #[arg(long)]
        family: Option<String>,
        /// Only saved models.
        #[arg(long)]
        saved: bool,
        /// Only active models.
        #[arg(long)]
        active: bool,
        /// Case-insensitive match on id, name or description.
        #[arg(long)]
        search: Option<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Apply one action to several models.
    Bulk {
        /// Provider id.
        provider: String,
        /// save, unsave, activate or deactivate.
        action: BulkAction,
        /// Model ids.
        #[arg(required = true)]
        models: Vec<String>,
    },
    /// Make one model the provider's default.
    Default {
        /// Provider id.
        provider: String,
        /// Model id.
        model: String,
    },
}

pub async fn handle_models(console: &ProviderConsole, action: ModelAction) -> Result<()> {
    match action {
        ModelAction::List {
            provider,
            family,
            saved,
            active,
            search,
            json,
        } => {
            let id = ProviderId::from(provider);
            console.fetch_models(&id).await?;
            let query = ModelQuery {
                family,
                saved: saved.then_some(true),
                active: active.then_some(true),
                deprecated: None,
                search,
            };
            let models = console.models(&id, &query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                println!("No matching models.");
            } else {
                for model in &models {
                    println!("{}", model_line(model));
                }
            }
            Ok(())
        },
        ModelAction::Bulk {
            provider,
            action,
            models,
        } => {
            let id = ProviderId::from(provider);
            let models: Vec<ModelId> = models.into_iter().map(ModelId::from).collect();
            console.fetch_models(&id).await?;
            let outcome = console.execute(&id, &models, action).await?;
            print_outcome(&outcome);
            Ok(())
        },
        ModelAction::Default { provider, model } => {
            let id = ProviderId::from(provider);
            console.fetch_models(&id).await?;
            let outcome = console
                .execute(&id, &[ModelId::from(model)], BulkAction::SetDefault)
                .await?;
            print_outcome(&outcome);
            Ok(())
        },
    }
}

fn model_line(model: &ProviderModel) -> String {
    let flags = [
        (model.is_saved, 'S'),
        (model.is_active, 'A'),
        (model.is_default, 'D'),
    ]
    .iter()
    .map(|&(on, c)| if on { c } else { '-' })
    .collect::<String>();
    let deprecated = if model.is_deprecated {
        " (deprecated)"
    } else {
        ""
    };
    format!("  [{flags}] {}  {}{deprecated}", model.id, model.name)
}

fn print_outcome(outcome: &BulkOutcome) {
    if outcome.deltas.is_empty() {
        println!("Nothing to change.");
        return;
    }
    for delta in &outcome.deltas {
        let changes: Vec<String> = [
            ("saved", delta.patch.is_saved),
            ("active", delta.patch.is_active),
            ("default", delta.patch.is_default),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|on| format!("{}{name}", if on { "+" } else { "-" })))
        .collect();
        println!("  {}: {}", delta.model_id, changes.join(" "));
    }
    println!(
        "{} model(s) changed in {} call(s)",
        outcome.deltas.len(),
        outcome.batches
    );
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::BTreeSet};

    #[test]
    fn model_line_shows_flags() {
        let model = ProviderModel {
            id: ModelId::new("gpt-4o"),
            family: "gpt".into(),
            name: "GPT-4o".into(),
            description: String::new(),
            context_window: None,
            max_tokens: None,
            input_cost: None,
            output_cost: None,
            capabilities: BTreeSet::new(),
            is_deprecated: true,
            is_saved: true,
            is_active: true,
            is_default: false,
        };
        assert_eq!(model_line(&model), "  [SA-] gpt-4o  GPT-4o (deprecated)");
    }
}
