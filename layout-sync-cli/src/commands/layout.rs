use clap::{Subcommand, ValueEnum};
use std::io::{self, Read, Write};
use std::path::Path;

use layout_sync_core::{Layout, LayoutData, LayoutId, LayoutPermission, LayoutUpdate, NewLayout};

use crate::config::Config;
use crate::session::Session;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum LayoutCommand {
    /// List layouts
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only layouts belonging to this parent
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show layout details
    Show {
        /// Layout ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a new layout
    Create {
        /// Layout name
        name: String,

        /// Parent the layout belongs to (defaults to the configured parent)
        #[arg(long)]
        parent: Option<String>,

        /// Permission (creator-write, org-read, org-write)
        #[arg(long, default_value = "creator-write")]
        permission: String,

        /// JSON file with the layout data, or '-' for stdin
        #[arg(long)]
        data: Option<String>,
    },

    /// Edit a layout
    Edit {
        /// Layout ID
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// JSON file with the new layout data, or '-' for stdin
        #[arg(long)]
        data: Option<String>,
    },

    /// Delete a layout
    Delete {
        /// Layout ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Discard unsynced changes to a layout
    Revert {
        /// Layout ID
        id: String,
    },

    /// Make a personal copy of a layout
    Copy {
        /// Layout ID
        id: String,

        /// Name for the copy (defaults to "<name> (copy)")
        #[arg(long)]
        name: Option<String>,
    },

    /// Mark a layout as the current one for its parent
    Select {
        /// Layout ID
        id: String,
    },

    /// Show the last selected layout for a parent
    Last {
        /// Parent (defaults to the configured parent)
        #[arg(long)]
        parent: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl LayoutCommand {
    /// Commands that should see fresh remote data.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            LayoutCommand::List { .. } | LayoutCommand::Show { .. } | LayoutCommand::Last { .. }
        )
    }

    /// Commands whose local changes should be pushed afterwards.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            LayoutCommand::Create { .. }
                | LayoutCommand::Edit { .. }
                | LayoutCommand::Delete { .. }
                | LayoutCommand::Revert { .. }
                | LayoutCommand::Copy { .. }
        )
    }

    pub async fn run(
        &self,
        session: &Session,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let manager = &session.manager;

        match self {
            LayoutCommand::List { format, parent } => {
                let mut layouts = manager.get_layouts().await?;
                if let Some(parent) = parent {
                    layouts.retain(|l| &l.parent == parent);
                }

                if layouts.is_empty() {
                    println!("No layouts found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&layouts)?);
                    }
                    OutputFormat::Text => {
                        for layout in &layouts {
                            println!(
                                "{}  {:30} {:10} {}",
                                layout.id,
                                layout.name,
                                layout.parent,
                                status_label(layout)
                            );
                        }
                        println!("\nTotal: {} layout(s)", layouts.len());
                    }
                }
                Ok(())
            }

            LayoutCommand::Show { id, format } => {
                let layout = require(session, id).await?;
                print_layout(&layout, format)
            }

            LayoutCommand::Create {
                name,
                parent,
                permission,
                data,
            } => {
                let permission: LayoutPermission = permission.parse()?;
                let data = match data {
                    Some(source) => read_data(source)?,
                    None => serde_json::json!({}),
                };
                let parent = parent
                    .clone()
                    .unwrap_or_else(|| config.parent.value.clone());

                let created = manager
                    .save_new_layout(NewLayout {
                        name: name.clone(),
                        parent,
                        permission,
                        data,
                    })
                    .await?;
                println!("Created layout:");
                print_layout(&created, &OutputFormat::Text)
            }

            LayoutCommand::Edit { id, name, data } => {
                if name.is_none() && data.is_none() {
                    return Err("Nothing to change. Use --name or --data.".into());
                }
                let data = match data {
                    Some(source) => Some(read_data(source)?),
                    None => None,
                };

                let updated = manager
                    .update_layout(
                        &LayoutId::from(id.as_str()),
                        LayoutUpdate {
                            name: name.clone(),
                            data,
                        },
                    )
                    .await?;
                println!("Updated layout:");
                print_layout(&updated, &OutputFormat::Text)
            }

            LayoutCommand::Delete { id, force } => {
                let layout = require(session, id).await?;

                if !force {
                    print!("Delete layout '{}'? [y/N] ", layout.name);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                manager.delete_layout(&layout.id).await?;
                println!("Deleted layout: {}", layout.name);
                Ok(())
            }

            LayoutCommand::Revert { id } => {
                match manager.revert_layout(&LayoutId::from(id.as_str())).await? {
                    Some(layout) => {
                        println!("Reverted layout:");
                        print_layout(&layout, &OutputFormat::Text)?;
                    }
                    None => println!("Layout was deleted on the server; removed local copy."),
                }
                Ok(())
            }

            LayoutCommand::Copy { id, name } => {
                let source = require(session, id).await?;
                let name = name
                    .clone()
                    .unwrap_or_else(|| format!("{} (copy)", source.name));

                let copy = manager.make_personal_copy(&source.id, name).await?;
                println!("Created personal copy:");
                print_layout(&copy, &OutputFormat::Text)
            }

            LayoutCommand::Select { id } => {
                let history = manager.select_layout(&LayoutId::from(id.as_str())).await?;
                println!(
                    "Selected layout {} for '{}'",
                    history.layout_id, history.parent
                );
                Ok(())
            }

            LayoutCommand::Last { parent, format } => {
                let parent = parent
                    .clone()
                    .unwrap_or_else(|| config.parent.value.clone());

                match manager.last_selected_layout(&parent).await? {
                    Some(layout) => print_layout(&layout, format),
                    None => {
                        println!("No layout selected for '{}'", parent);
                        Ok(())
                    }
                }
            }
        }
    }
}

async fn require(session: &Session, id: &str) -> Result<Layout, Box<dyn std::error::Error>> {
    session
        .manager
        .get_layout(&LayoutId::from(id))
        .await?
        .ok_or_else(|| format!("Layout not found: {}", id).into())
}

fn status_label(layout: &Layout) -> String {
    if layout.permission.is_shared() {
        format!("{} ({})", layout.status(), layout.permission)
    } else {
        layout.status().to_string()
    }
}

fn print_layout(layout: &Layout, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(layout)?);
        }
        OutputFormat::Text => {
            println!("ID:         {}", layout.id);
            println!("Name:       {}", layout.name);
            println!("Parent:     {}", layout.parent);
            println!("Permission: {}", layout.permission);
            println!("Status:     {}", layout.status());
            println!("Saved at:   {}", layout.current().saved_at.to_rfc3339());
            if layout.has_local_changes() {
                println!(
                    "Baseline:   {} (unsynced changes)",
                    layout.baseline.saved_at.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

/// Reads layout data from a JSON file, or stdin for `-`.
fn read_data(source: &str) -> Result<LayoutData, Box<dyn std::error::Error>> {
    let contents = if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .map_err(|e| format!("Failed to read '{}': {}", source, e))?
    };

    serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid layout data in '{}': {}", source, e).into())
}
