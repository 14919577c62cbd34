/* armouryctl CLI: clap-driven client that talks to armouryd over DBus to
 * list, inspect and change ASUS firmware attributes. */
mod dbus_client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dbus_client::{ArmouryClient, attribute_name};

/// armouryctl: change ASUS ROG firmware settings via the armouryd DBus daemon.
#[derive(Parser)]
#[command(name = "armouryctl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the firmware attributes of this machine with their values.
    List,

    /// Show everything known about one attribute.
    Info {
        /// Attribute name, e.g. gpu_mux_mode.
        attribute: String,
    },

    /// Print the current value of an attribute.
    Get {
        /// Attribute name.
        attribute: String,
    },

    /// Change an attribute.
    Set {
        /// Attribute name.
        attribute: String,
        /// New value; on/off, true/false and yes/no are accepted for 1/0.
        value: String,
    },

    /// Tell whether a changed setting needs a reboot to apply.
    #[command(name = "reboot-status")]
    RebootStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ArmouryClient::connect()
        .await
        .context("Failed to connect to armouryd on org.asuslinux.Armoury1")?;

    match cli.command {
        Commands::List => cmd_list(&client).await,
        Commands::Info { attribute } => cmd_info(&client, &attribute).await,
        Commands::Get { attribute } => cmd_get(&client, &attribute).await,
        Commands::Set { attribute, value } => cmd_set(&client, &attribute, &value).await,
        Commands::RebootStatus => cmd_reboot_status(&client).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_list(client: &ArmouryClient) -> Result<()> {
    let api = client.get_api_version().await.unwrap_or(-1);
    let product = client.get_product_name().await.unwrap_or_default();
    let attributes = client.list_attributes().await?;
    println!("{} (API version {})", product, api);
    if attributes.is_empty() {
        println!("No firmware attributes found.");
        return Ok(());
    }
    for path in &attributes {
        let value = match client.get_current_value(path).await {
            Ok(v) => v.to_string(),
            Err(_) => "?".to_string(),
        };
        let display = client.get_display_name(path).await.unwrap_or_default();
        println!("{:<20} {:>5}  {}", attribute_name(path), value, display);
    }
    Ok(())
}

async fn cmd_info(client: &ArmouryClient, attribute: &str) -> Result<()> {
    let path = client.resolve_attribute(attribute).await?;
    let info = client.get_attribute_info(&path).await?;

    println!("Attribute:      {}", info.name);
    println!("Description:    {}", info.display_name);
    println!("Type:           {}", info.attr_type);
    match info.current_value {
        Some(v) => println!("Current value:  {}", v),
        None => println!("Current value:  (unreadable)"),
    }
    if info.attr_type == "enumeration" {
        println!("Possible:       {}", possible_values_string(&info.possible_values));
    } else if info.max_value > 0 {
        println!("Default:        {}", info.default_value);
        println!(
            "Range:          {}..={} (step {})",
            info.min_value, info.max_value, info.scalar_increment
        );
    }
    println!("Read-only:      {}", info.read_only);
    if info.requires_reboot {
        println!("Takes effect after a reboot.");
    }
    Ok(())
}

async fn cmd_get(client: &ArmouryClient, attribute: &str) -> Result<()> {
    let path = client.resolve_attribute(attribute).await?;
    println!("{}", client.get_current_value(&path).await?);
    Ok(())
}

async fn cmd_set(client: &ArmouryClient, attribute: &str, value: &str) -> Result<()> {
    let path = client.resolve_attribute(attribute).await?;
    let stored = client.store(&path, &normalize_value(value)).await?;
    println!("{} set to {}.", attribute, stored);
    if client.get_pending_reboot().await.unwrap_or(false) {
        println!("A reboot is required for the change to take effect.");
    }
    Ok(())
}

async fn cmd_reboot_status(client: &ArmouryClient) -> Result<()> {
    if client.get_pending_reboot().await? {
        println!("A reboot is pending.");
    } else {
        println!("No reboot needed.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map the usual boolean words to 0/1; anything else is passed through
/// for the daemon to validate.
fn normalize_value(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" => "1".to_string(),
        "off" | "false" | "no" => "0".to_string(),
        _ => value.trim().to_string(),
    }
}

fn possible_values_string(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_words_are_normalized() {
        assert_eq!(normalize_value("on"), "1");
        assert_eq!(normalize_value("Yes"), "1");
        assert_eq!(normalize_value("OFF"), "0");
        assert_eq!(normalize_value("false"), "0");
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(normalize_value(" 65 "), "65");
        assert_eq!(normalize_value("bogus"), "bogus");
    }

    #[test]
    fn possible_values_are_semicolon_separated() {
        assert_eq!(possible_values_string(&[0, 1, 2]), "0;1;2");
        assert_eq!(possible_values_string(&[]), "");
    }
}
