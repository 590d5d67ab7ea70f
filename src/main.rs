use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use structured_llm::agent::Agent;
use structured_llm::agent::tools::{CheckWeather, RollDice};
use structured_llm::classify::sentiment;
use structured_llm::config::{Config, HistoryStrategy};
use structured_llm::history::{KeepLast, KeepLastWithTools, TokenGuard, UserOnly};
use structured_llm::llm::{
    GenerationRequest, GenerationService, LlmClient, Provider, ReasoningEffort,
};
use structured_llm::ocr::{self, DocumentAnalyzer, OcrMode};
use structured_llm::{Classifier, LlmOverride};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "sllm",
    about = "Structured-output LLM toolkit: classification, OCR, chat with tools"
)]
struct Cli {
    /// Path to config file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// LLM provider override: openai, anthropic, openrouter, ollama
    #[arg(long, global = true)]
    provider: Option<String>,

    /// LLM model override
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Classify text into categories supplied at run time
    Classify {
        /// Text to classify
        #[arg(long)]
        text: String,

        /// Comma-separated category labels
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<String>,

        /// Domain used in the prompt, e.g. emotion, priority
        #[arg(long)]
        domain: Option<String>,
    },

    /// Run three-class sentiment classification over the built-in review samples
    Sentiment,

    /// OCR every page image in a directory and save the results as JSON
    Ocr {
        /// Directory holding page images
        dir: PathBuf,

        /// Page image extension
        #[arg(long, default_value = "jpg")]
        ext: String,

        /// basic (Markdown text) or structured (validated page analysis)
        #[arg(long)]
        mode: Option<String>,

        /// Directory for the results file (overrides ocr.results_dir)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Base name of the results file (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Multi-turn chat with tools; each prompt is one turn
    Chat {
        /// Prompts sent in order, sharing history
        #[arg(required = true)]
        prompts: Vec<String>,

        /// History strategy: full, keep_last, keep_last_with_tools, user_only, token_guard
        #[arg(long)]
        history: Option<String>,

        /// Messages kept by keep_last strategies
        #[arg(long)]
        keep: Option<usize>,

        /// Comma-separated tools: roll_dice, check_weather
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,
    },

    /// Send one prompt directly and print the reply with token usage
    Generate {
        prompt: String,

        /// System prompt
        #[arg(long, default_value = "")]
        system: String,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Reasoning effort: low, medium, high
        #[arg(long)]
        reasoning_effort: Option<String>,

        /// Maximum tokens in the reply
        #[arg(long)]
        max_tokens: Option<u32>,
    },
}

fn make_llm_override(provider: Option<String>, model: Option<String>) -> Result<LlmOverride> {
    let provider = provider.map(|p| Provider::parse(&p)).transpose()?;
    Ok(LlmOverride { provider, model })
}

fn parse_history(name: &str) -> Result<HistoryStrategy> {
    let strategy = match name {
        "full" => HistoryStrategy::Full,
        "keep_last" => HistoryStrategy::KeepLast,
        "keep_last_with_tools" => HistoryStrategy::KeepLastWithTools,
        "user_only" => HistoryStrategy::UserOnly,
        "token_guard" => HistoryStrategy::TokenGuard,
        other => anyhow::bail!("unknown history strategy '{other}'"),
    };
    Ok(strategy)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("structured_llm=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(&cli.config)?;
    make_llm_override(cli.provider, cli.model)?.apply(&mut cfg.llm);

    match cli.command {
        Command::Classify {
            text,
            categories,
            domain,
        } => {
            cfg.validate()?;
            let llm = LlmClient::from_config(&cfg.llm)?;
            let classifier = Classifier::from_config(llm, &cfg.classifier);
            let result = classifier
                .classify(&text, &categories, domain.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Sentiment => {
            cfg.validate()?;
            let llm = LlmClient::from_config(&cfg.llm)?;
            let classifier = Classifier::from_config(llm, &cfg.classifier);
            let report = sentiment::evaluate(&classifier, &sentiment::SAMPLE_REVIEWS).await?;
            for (i, outcome) in report.outcomes.iter().enumerate() {
                println!("Review {}/{}: {}", i + 1, report.total, outcome.text);
                match (&outcome.predicted, &outcome.error) {
                    (Some(predicted), _) => {
                        println!("  Sentiment: {predicted}");
                        println!(
                            "  Reasoning: {}",
                            outcome.reasoning.as_deref().unwrap_or_default()
                        );
                    }
                    (None, Some(err)) => println!("  Error: {err}"),
                    (None, None) => {}
                }
                println!("  Expected: {}", outcome.expected);
                println!(
                    "  Status: {}",
                    if outcome.is_correct() { "Correct" } else { "Incorrect" }
                );
            }
            println!(
                "\nResults: {}/{} correct ({:.1}% accuracy)",
                report.correct,
                report.total,
                report.accuracy()
            );
            Ok(())
        }
        Command::Ocr {
            dir,
            ext,
            mode,
            results_dir,
            name,
        } => {
            if let Some(mode) = mode {
                cfg.ocr.mode = OcrMode::parse(&mode)?;
            }
            cfg.validate()?;
            let llm = LlmClient::from_config(&cfg.llm)?;
            let analyzer = DocumentAnalyzer::from_config(llm, &cfg.ocr);

            let pages = ocr::list_files(&dir, &ext)?;
            if pages.is_empty() {
                anyhow::bail!("no .{ext} files in {}", dir.display());
            }
            let outputs = analyzer.analyze_pages(&pages).await?;

            let base = name.unwrap_or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".into())
            });
            let save_dir = results_dir.unwrap_or_else(|| cfg.ocr.results_dir.clone());
            let path = analyzer.save_results(&base, &outputs, &save_dir)?;
            println!("{} page(s) analyzed, results in {}", outputs.len(), path.display());
            Ok(())
        }
        Command::Chat {
            prompts,
            history,
            keep,
            tools,
        } => {
            if let Some(h) = history {
                cfg.agent.history = parse_history(&h)?;
            }
            if let Some(k) = keep {
                cfg.agent.keep_messages = k;
            }
            if let Some(t) = tools {
                cfg.agent.tools = t;
            }
            cfg.validate()?;
            let llm = LlmClient::from_config(&cfg.llm)?;
            let agent = build_agent(llm, &cfg)?;

            let mut messages = Vec::new();
            for prompt in &prompts {
                let run = agent.run(prompt, messages).await?;
                println!("> {prompt}\n{}\n", run.output);
                info!(
                    turns = run.turns,
                    total_messages = run.messages.len(),
                    "chat turn complete"
                );
                messages = run.messages;
            }
            Ok(())
        }
        Command::Generate {
            prompt,
            system,
            temperature,
            reasoning_effort,
            max_tokens,
        } => {
            cfg.validate()?;
            let llm = LlmClient::from_config(&cfg.llm)?;
            let mut settings = llm.settings();
            if let Some(t) = temperature {
                settings.temperature = Some(t);
            }
            if let Some(effort) = reasoning_effort {
                settings.reasoning_effort = Some(ReasoningEffort::parse(&effort)?);
            }
            if let Some(m) = max_tokens {
                settings.max_tokens = m;
            }
            let request = GenerationRequest::new(system, prompt).with_settings(settings);
            let completion = llm.generate(&request).await?;
            println!("{}", completion.text());
            println!(
                "\nUsage: {} input tokens, {} output tokens",
                completion.usage.input_tokens, completion.usage.output_tokens
            );
            Ok(())
        }
    }
}

fn build_agent(llm: LlmClient, cfg: &Config) -> Result<Agent<LlmClient>> {
    let agent_cfg = &cfg.agent;
    let mut agent = Agent::new(llm, agent_cfg.system_prompt.clone())
        .with_max_turns(agent_cfg.max_turns);

    agent = match agent_cfg.history {
        HistoryStrategy::Full => agent,
        HistoryStrategy::KeepLast => agent.with_processor(KeepLast(agent_cfg.keep_messages)),
        HistoryStrategy::KeepLastWithTools => {
            agent.with_processor(KeepLastWithTools(agent_cfg.keep_messages))
        }
        HistoryStrategy::UserOnly => agent.with_processor(UserOnly),
        HistoryStrategy::TokenGuard => agent.with_processor(TokenGuard {
            threshold: agent_cfg.token_threshold,
        }),
    };

    for tool in &agent_cfg.tools {
        agent = match tool.as_str() {
            "roll_dice" => agent.with_tool(RollDice),
            "check_weather" => agent.with_tool(
                CheckWeather::from_env().context("check_weather tool needs WEATHER_API_KEY")?,
            ),
            other => anyhow::bail!("unknown tool '{other}'"),
        };
    }
    Ok(agent)
}
