
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, GeminiConfig, OllamaConfig, ProviderKind};

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Co-founder Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    let providers = &["ollama", "gemini"];
    let default_index = match config.provider {
        ProviderKind::Ollama => 0,
        ProviderKind::Gemini => 1,
    };
    let provider_index = Select::new()
        .with_prompt("Model provider")
        .default(default_index)
        .items(providers)
        .interact()?;
    config.provider = if provider_index == 0 {
        ProviderKind::Ollama
    } else {
        ProviderKind::Gemini
    };

    eprintln!();
    match config.provider {
        ProviderKind::Ollama => {
            eprintln!("{}", style("Ollama Configuration").bold().yellow());
            eprintln!("Configure your local Ollama instance for embeddings and answers.");
            eprintln!();

            configure_ollama(&mut config.ollama)?;

            eprintln!();
            eprintln!("{}", style("Testing configuration...").yellow());

            if test_ollama_connection(&config.ollama)? {
                eprintln!("{}", style("✓ Ollama connection successful!").green());
            } else {
                eprintln!(
                    "{}",
                    style("⚠ Warning: Could not connect to Ollama").yellow()
                );
                eprintln!("You can continue, but make sure Ollama is running before serving.");
            }
        }
        ProviderKind::Gemini => {
            eprintln!("{}", style("Gemini Configuration").bold().yellow());
            eprintln!("The API key is read from the environment and never saved to disk.");
            eprintln!();

            configure_gemini(&mut config.gemini)?;

            eprintln!();
            match config.gemini.api_key() {
                Ok(_) => eprintln!("{}", style("✓ API key found in environment").green()),
                Err(e) => eprintln!("{}", style(format!("⚠ Warning: {e}")).yellow()),
            }
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("Provider: {}", style(config.provider).cyan());
    eprintln!();

    match config.provider {
        ProviderKind::Ollama => {
            eprintln!("{}", style("Ollama Settings:").bold().yellow());
            match config.ollama.ollama_url() {
                Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
                Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
            }
            eprintln!(
                "  Embedding model: {}",
                style(&config.ollama.embedding_model).cyan()
            );
            eprintln!(
                "  Generation model: {}",
                style(&config.ollama.generation_model).cyan()
            );
        }
        ProviderKind::Gemini => {
            eprintln!("{}", style("Gemini Settings:").bold().yellow());
            eprintln!("  API base: {}", style(&config.gemini.api_base).cyan());
            eprintln!(
                "  Embedding model: {}",
                style(&config.gemini.embedding_model).cyan()
            );
            eprintln!(
                "  Generation model: {}",
                style(&config.gemini.generation_model).cyan()
            );
            let key_state = if config.gemini.api_key().is_ok() {
                style("set").green()
            } else {
                style("missing").red()
            };
            eprintln!("  API key (${}): {}", config.gemini.api_key_env, key_state);
        }
    }
    eprintln!(
        "  Embedding dimension: {}",
        style(config.embedding_dimension()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Default limit: {} (max {})",
        style(config.retrieval.default_limit).cyan(),
        config.retrieval.max_limit
    );
    eprintln!(
        "  Generation timeout: {}s",
        style(config.retrieval.generation_timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server Settings:").bold().yellow());
    eprintln!(
        "  Listen: {}",
        style(format!("{}:{}", config.server.host, config.server.port)).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    let config_path = base_dir.join("config.toml");
    if !config_path.exists() {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        return Ok(Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        });
    }

    let config = Config::load(base_dir)?;
    eprintln!("{}", style("Found existing configuration.").green());
    Ok(config)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(ollama.generation_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_generation_model(generation_model)?;
    ollama.set_embedding_dimension(embedding_dimension)?;

    Ok(())
}

fn configure_gemini(gemini: &mut GeminiConfig) -> Result<()> {
    gemini.embedding_model = Input::new()
        .with_prompt("Embedding model")
        .default(gemini.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    gemini.generation_model = Input::new()
        .with_prompt("Generation model")
        .default(gemini.generation_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    gemini.api_key_env = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(gemini.api_key_env.clone())
        .validate_with(non_empty)
        .interact_text()?;

    gemini.validate()?;
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
