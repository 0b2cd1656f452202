//! Dockerfile synthesis for one image.
//!
//! Every imported image with a recorded export becomes a named stage pinned
//! to the built image id. Stages are declared up front because a
//! `COPY --from=<name>` may only reference a stage declared before it, while
//! imports can appear anywhere in the script.

use crate::config::ImageSpec;
use crate::registry::ExportRegistry;
use crate::script::BuildScript;

/// Renders the Dockerfile text for `image` against the exports recorded so far.
pub fn compile(image: &ImageSpec, registry: &ExportRegistry) -> String {
    let mut lines = Vec::new();
    let mut staged: Vec<&str> = Vec::new();

    for name in image.imports() {
        if staged.contains(&name) {
            continue;
        }
        staged.push(name);

        if let Some(export) = registry.get(name) {
            lines.push(format!("FROM {} AS {}", export.image_id, name));
        }
    }

    lines.push(format!("FROM {}", image.from));

    for script in &image.scripts {
        match script {
            BuildScript::Import(name) => match registry.get(name) {
                Some(export) if !export.files.is_empty() => {
                    lines.push(format!(
                        "COPY --from={} {} /",
                        name,
                        export.files.join(" ")
                    ));
                }
                _ => lines.push(format!("# No exported files from {:?}", name)),
            },
            BuildScript::Instruction { instruction, value } => {
                lines.push(format!("{} {}", instruction, value));
            }
            BuildScript::Raw(line) => lines.push(line.clone()),
        }
    }

    lines.join("\n")
}
