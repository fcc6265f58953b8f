//! The `ocr` subcommand.

use clap::Args;

use crate::{
    config::AzureConfig,
    image_file::{DEFAULT_IMAGE_PATH, read_image},
    poll::{PollOutcome, PollPolicy},
    prelude::*,
    read_api::{OperationId, ReadApi, azure::AzureReadClient},
    ui::Ui,
};

use super::{OutputOpts, PollOpts, ctrl_c, wait_for_operation};

/// Options for the `ocr` subcommand.
#[derive(Debug, Clone, Args)]
pub struct OcrOpts {
    /// The image to OCR.
    #[clap(default_value = DEFAULT_IMAGE_PATH)]
    pub input_path: PathBuf,

    /// Language hint passed to the OCR service.
    #[clap(long, default_value = "ja")]
    pub language: String,

    #[clap(flatten)]
    pub poll_opts: PollOpts,

    #[clap(flatten)]
    pub output_opts: OutputOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let config = AzureConfig::from_env()?;
    let image = read_image(&opts.input_path).await?;
    let client = AzureReadClient::new(config)?;

    let (id, outcome) = recognize_image(
        &ui,
        &client,
        image,
        &opts.language,
        &opts.poll_opts.to_policy(),
        ctrl_c(),
    )
    .await?;
    let result = outcome.into_result(&id)?;
    opts.output_opts.write_result(&result).await
}

/// Submit `image` and wait for the OCR operation to finish.
pub async fn recognize_image<A, C>(
    ui: &Ui,
    api: &A,
    image: Vec<u8>,
    language: &str,
    policy: &PollPolicy,
    cancel: C,
) -> Result<(OperationId, PollOutcome)>
where
    A: ReadApi + ?Sized,
    C: Future<Output = ()>,
{
    let id = api.submit(image, language).await?;
    info!(%id, "Submitted image for OCR");

    let outcome = wait_for_operation(ui, api, &id, policy, cancel).await?;
    Ok((id, outcome))
}
