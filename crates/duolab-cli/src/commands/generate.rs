use std::time::Instant;

use anyhow::Result;
use log::info;

use duolab_models::Gpt2Model;
use duolab_transformers::{
    DecoderGenerator, DecodingStrategy, GenerationConfig, GenerationOutput, ModelLoadConfig, ModelType,
};

use super::util::format_elapsed;
use crate::GenerateArgs;

/// Positions the GPT-2 preprocessor pads to.
const SEQUENCE_LENGTH: usize = 1024;

pub fn generation_config(args: &GenerateArgs) -> GenerationConfig {
    let strategy = if args.greedy {
        DecodingStrategy::Greedy
    } else {
        DecodingStrategy::TopK {
            k: args.top_k,
            temperature: args.temperature,
        }
    };
    GenerationConfig {
        max_length: args.max_length,
        strategy,
        seed: args.seed,
        // GPT-2 presets start from <|endoftext|>, counted in max_length.
        add_bos_token: true,
        ..Default::default()
    }
}

pub fn resolve_model(name: &str) -> Result<ModelType> {
    Ok(name.parse::<ModelType>()?)
}

/// The lines printed after a generation, in order.
pub fn render_output(output: &GenerationOutput, elapsed: std::time::Duration) -> Vec<String> {
    vec![
        String::new(),
        "GPT-2 output:".to_string(),
        output.text.clone(),
        format_elapsed(elapsed),
    ]
}

pub async fn run(args: &GenerateArgs) -> Result<()> {
    let model_type = resolve_model(&args.model)?;
    let load_config = ModelLoadConfig::default()
        .with_precision(args.precision)
        .with_max_sequence_length(SEQUENCE_LENGTH);

    info!("Loading {} with {} precision", model_type.display_name(), args.precision);
    let model = Gpt2Model::from_registry(model_type, args.cache_dir.clone(), load_config).await?;
    let generator = DecoderGenerator::new(Box::new(model));
    let config = generation_config(args);

    let start = Instant::now();
    let output = generator.generate(&args.prompt, &config)?;
    info!(
        "Generated {} tokens after a {}-token prompt ({})",
        output.generated_tokens.len(),
        output.prompt_tokens.len(),
        output.stop_reason
    );

    let lines = render_output(&output, start.elapsed());
    for line in &lines {
        println!("{}", line);
    }
    Ok(())
}
