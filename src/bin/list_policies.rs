//! list-policies - Print the image policies the webhook would evaluate.
//!
//! Uses the current kubeconfig or in-cluster identity. Also lists the
//! ValidatingWebhookConfigurations that route Pods to the webhook, which
//! helps when admission appears to be bypassed.

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use kube::api::{Api, ListParams};
use kube::Client;

use image_policy_webhook::policy::KubePolicySource;
use image_policy_webhook::webhooks::VALIDATE_POD_PATH;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Ignore the error: it only means a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let client = Client::try_default().await?;

    let listing = KubePolicySource::new(client.clone())
        .list_with_skipped()
        .await
        .map_err(|e| format!("failed to list ClusterImagePolicy: {}", e))?;

    println!("ClusterImagePolicy: {} item(s)", listing.policies.len());
    for policy in &listing.policies {
        println!("- {} (action: {})", policy.name, policy.action);
        println!("    namespaces: {}", policy.namespaces.join(", "));
        for rule in &policy.images {
            println!("    image: {}", rule.glob);
        }
    }

    if !listing.skipped.is_empty() {
        println!("Skipped (malformed): {} item(s)", listing.skipped.len());
        for skipped in &listing.skipped {
            println!("- {}: {}", skipped.name, skipped.error);
        }
    }

    let webhooks: Api<ValidatingWebhookConfiguration> = Api::all(client);
    let configs = webhooks
        .list(&ListParams::default())
        .await
        .map_err(|e| format!("failed to list ValidatingWebhookConfiguration: {}", e))?;

    println!("ValidatingWebhookConfiguration for {}:", VALIDATE_POD_PATH);
    for config in &configs.items {
        let name = config.metadata.name.as_deref().unwrap_or_default();
        for webhook in config.webhooks.iter().flatten() {
            let path = webhook
                .client_config
                .service
                .as_ref()
                .and_then(|s| s.path.as_deref());
            if path == Some(VALIDATE_POD_PATH) {
                println!(
                    "- {}/{} (failurePolicy: {})",
                    name,
                    webhook.name,
                    webhook.failure_policy.as_deref().unwrap_or("Fail")
                );
            }
        }
    }

    Ok(())
}
