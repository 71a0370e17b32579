use std::collections::BTreeSet;

use serde::Serialize;
use setting_manager_core::api::{ErrorBody, SectionView, SettingView};
use setting_manager_core::{Error, Result};

use crate::cli::OutputFormat;

#[derive(Serialize)]
struct JsonEnvelope<'a, T: Serialize> {
    status: &'static str,
    command: &'a str,
    data: T,
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    output_format: OutputFormat,
}

impl Renderer {
    pub fn new(output_format: OutputFormat) -> Self {
        Self { output_format }
    }

    pub fn render_sections(&self, sections: &[SectionView]) -> Result<()> {
        match self.output_format {
            OutputFormat::Json => self.print_json("list", sections),
            OutputFormat::Text => {
                for section in sections {
                    println!("[{}]", section.name);
                    for setting in &section.settings {
                        println!("  {}", text_line(setting));
                    }
                }
                Ok(())
            }
        }
    }

    pub fn render_setting(&self, command: &str, setting: &SettingView) -> Result<()> {
        match self.output_format {
            OutputFormat::Json => self.print_json(command, setting),
            OutputFormat::Text => {
                println!("{}", text_line(setting));
                if !setting.description.is_empty() {
                    println!("  {}", setting.description);
                }
                Ok(())
            }
        }
    }

    pub fn render_changed(&self, command: &str, changed: &[String]) -> Result<()> {
        match self.output_format {
            OutputFormat::Json => self.print_json(command, changed),
            OutputFormat::Text => {
                if changed.is_empty() {
                    println!("No settings changed.");
                } else {
                    println!("Changed: {}", changed.join(", "));
                }
                Ok(())
            }
        }
    }

    pub fn render_removed(&self, removed: &BTreeSet<String>) -> Result<()> {
        match self.output_format {
            OutputFormat::Json => self.print_json("sweep", removed),
            OutputFormat::Text => {
                if removed.is_empty() {
                    println!("No stale overrides.");
                }
                for key in removed {
                    println!("removed {key}");
                }
                Ok(())
            }
        }
    }

    pub fn render_error(&self, command: &str, error: &Error) {
        let body = ErrorBody::from(error);
        let envelope = serde_json::json!({
            "status": "error",
            "command": command,
            "code": error.status_code(),
            "error": body,
        });
        println!("{envelope}");
    }

    fn print_json<T: Serialize>(&self, command: &str, data: T) -> Result<()> {
        let envelope = JsonEnvelope {
            status: "ok",
            command,
            data,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        Ok(())
    }
}

fn text_line(setting: &SettingView) -> String {
    let lock = if setting.editable { "" } else { " (read-only)" };
    format!(
        "{} = {} [{}, {}]{lock}",
        setting.name, setting.value, setting.declared_type, setting.source
    )
}
