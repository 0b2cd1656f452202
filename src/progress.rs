use crate::engine::BuildMessage;
use crate::error::LayercakeError;
use crate::notifier::Notifier;
use anyhow::Result;

/// Drains a build progress stream, echoing output as it arrives.
///
/// Returns the built image id. Any error message, transport failure, or a
/// stream that ends without reporting an id fails the build.
pub fn follow<I>(image: &str, messages: I, notifier: &Notifier) -> Result<String>
where
    I: IntoIterator<Item = Result<BuildMessage>>,
{
    let failed = |reason: String| LayercakeError::BuildFailed {
        image: image.to_string(),
        reason,
    };

    let mut image_id = None;

    for message in messages {
        let message = message.map_err(|e| failed(format!("{:#}", e)))?;

        if let Some(error) = message.error {
            return Err(failed(error.trim().to_string()).into());
        }
        if let Some(text) = message.stream {
            for line in text.lines() {
                notifier.stream(line);
            }
        }
        if let Some(status) = message.status {
            notifier.stream(&status);
        }
        if let Some(id) = message.aux_id {
            notifier.trace(&format!("Image {} reported id {}", image, id));
            image_id = Some(id);
        }
    }

    image_id.ok_or_else(|| failed("build finished without reporting an image id".to_string()).into())
}
