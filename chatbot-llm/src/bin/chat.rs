use anyhow::{Result, anyhow};
use chatbot::serve::{Loader, Surface};
use chatbot::{ChatError, Conversation, JinjaFormat, Role, Turn};
use clap::{Parser, ValueEnum};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;

use chatbot_llm::config::Settings;
use chatbot_llm::device::{DEFAULT_PRIORITY, DeviceKind, DtypeChoice, select_device};
use chatbot_llm::run::LlamaLoader;

#[derive(Parser, Debug)]
struct Args {
    /// Model name on Huggingface Hub, or a local model directory
    #[arg(
        short = 'm',
        long,
        default_value = "meta-llama/Meta-Llama-3-8B-Instruct"
    )]
    model: String,
    /// Hub revision
    #[arg(long, default_value = "main")]
    revision: String,
    /// Devices to try, in order of preference
    #[arg(short = 'd', long, value_enum, value_delimiter = ',', default_values_t = DEFAULT_PRIORITY.to_vec())]
    device: Vec<DeviceKind>,
    /// Weight dtype; defaults to f16 on accelerators and f32 on the CPU
    #[arg(long, value_enum)]
    dtype: Option<DtypeChoice>,
    /// System prompt rendered at the top of every prompt
    #[arg(short = 's', long)]
    system: Option<String>,
    /// Prompt template to use
    #[arg(short = 't', long, value_enum, default_value_t = TemplateChoice::Llama3)]
    template: TemplateChoice,
    /// JSON file with `generation` and `chat` settings
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// Only send the most recent turns to the model
    #[arg(long)]
    max_history_turns: Option<usize>,
    /// Drop the oldest exchanges until the prompt fits this many tokens
    #[arg(long)]
    max_prompt_tokens: Option<usize>,
    /// Sampling seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TemplateChoice {
    /// Built-in Llama-3 instruct format
    Llama3,
    /// The chat template shipped in the model's tokenizer_config.json
    Model,
}

struct Terminal {
    editor: DefaultEditor,
}

impl Terminal {
    fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl Surface for Terminal {
    fn read_input(&mut self) -> chatbot::Result<Option<String>> {
        match self.editor.readline("user> ") {
            Ok(line) => {
                if let Err(err) = self.editor.add_history_entry(line.as_str()) {
                    log::debug!("Line not added to editor history: {err}");
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(err) => Err(ChatError::SurfaceError(err.to_string())),
        }
    }

    fn show(&mut self, turn: &Turn) -> chatbot::Result<()> {
        // user input is already on screen from the line editor
        if turn.role() != Role::User {
            println!("\x1b[1m{}:\x1b[0m\n{}\n", turn.role(), turn.content());
        }
        Ok(())
    }

    fn show_error(&mut self, err: &ChatError) {
        eprintln!("\x1b[1merror:\x1b[0m {err}\n");
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if args.system.is_some() {
        settings.chat.system_prompt = args.system.clone();
    }
    if args.max_history_turns.is_some() {
        settings.chat.max_history_turns = args.max_history_turns;
    }
    if args.max_prompt_tokens.is_some() {
        settings.chat.max_prompt_tokens = args.max_prompt_tokens;
    }
    if let Some(seed) = args.seed {
        settings.generation.seed = seed;
    }
    Ok(settings)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let (kind, device) = select_device(&args.device)?;
    let dtype = args.dtype.map_or_else(|| kind.default_dtype(), Into::into);

    let loader = LlamaLoader::new(&args.model, &args.revision, device, dtype)?;
    let (tokenizer, generator) = loader.load()?;
    log::info!("Model {} loaded", args.model);
    println!(
        "\x1b[1mLLaMA3 Chatbot\x1b[0m ({} on {kind:?}), Ctrl-D to quit\n",
        args.model
    );

    let mut terminal = Terminal::new()?;
    match args.template {
        TemplateChoice::Llama3 => {
            Conversation::new(tokenizer, generator, settings.chat, settings.generation)?
                .run(&mut terminal)?
        }
        TemplateChoice::Model => {
            let template = tokenizer
                .chat_template()
                .ok_or_else(|| anyhow!("{} ships no chat template", args.model))?;
            let format = JinjaFormat::new(template, tokenizer.bos_token())?;
            Conversation::with_format(
                tokenizer,
                generator,
                format,
                settings.chat,
                settings.generation,
            )?
            .run(&mut terminal)?
        }
    }
    Ok(())
}
