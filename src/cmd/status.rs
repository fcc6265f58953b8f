//! The `status` subcommand, for checking on an operation we already submitted.

use clap::Args;

use crate::{
    config::AzureConfig,
    prelude::*,
    read_api::{OperationId, OperationStatus, ReadApi as _, azure::AzureReadClient},
    ui::Ui,
};

use super::{OutputOpts, PollOpts, ctrl_c, wait_for_operation};

/// Options for the `status` subcommand.
#[derive(Debug, Clone, Args)]
pub struct StatusOpts {
    /// The operation ID, or the full operation location URL.
    pub operation: OperationId,

    /// Keep polling until the operation succeeds or fails.
    #[clap(long)]
    pub wait: bool,

    #[clap(flatten)]
    pub poll_opts: PollOpts,

    #[clap(flatten)]
    pub output_opts: OutputOpts,
}

/// The `status` subcommand.
#[instrument(level = "debug", skip_all, fields(id = %opts.operation))]
pub async fn cmd_status(ui: Ui, opts: &StatusOpts) -> Result<()> {
    let config = AzureConfig::from_env()?;
    let client = AzureReadClient::new(config)?;
    let id = &opts.operation;

    let result = if opts.wait {
        wait_for_operation(&ui, &client, id, &opts.poll_opts.to_policy(), ctrl_c())
            .await?
            .into_result(id)?
    } else {
        let result = client.get_read_result(id).await?;
        info!(
            %id,
            status = %result.status,
            created = result.created_date_time.as_deref().unwrap_or("unknown"),
            updated = result.last_updated_date_time.as_deref().unwrap_or("unknown"),
            "ocr: {}",
            result.status
        );
        if !result.status.is_terminal() {
            info!(%id, "OCR operation has not finished yet; use --wait to keep polling");
            return Ok(());
        }
        if result.status == OperationStatus::Failed {
            return Err(anyhow!("OCR operation {id} failed"));
        }
        result.analyze_result.ok_or_else(|| {
            anyhow!("OCR operation {id} succeeded, but returned no analyzeResult")
        })?
    };
    opts.output_opts.write_result(&result).await
}
