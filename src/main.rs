use anyhow::Context;
use chaosmetric::codec::{decode_any, DecimalSeparator, ViewCodec};
use chaosmetric::generator::{FractalGenerator, GeneratorConfig, DEFAULT_HEIGHT, DEFAULT_MAX_ATTEMPTS, DEFAULT_WIDTH};
use chaosmetric::params::{SamplerSeed, DEFAULT_TABLE_SIZE};
use chaosmetric::{average_neighbor_and_variance, sampled_similarity, store, SuiteReport};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// chaosmetric - fractal test images and cipher quality metrics
///
/// Generates diverse Mandelbrot images to feed an image cipher, then measures
/// correlation, similarity and diffusion of the resulting ciphertexts.
#[derive(Parser)]
#[command(name = "chaosmetric")]
#[command(version)]
#[command(about = "Fractal test images and image-cipher metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Separator {
    Point,
    Comma,
}

impl From<Separator> for DecimalSeparator {
    fn from(value: Separator) -> Self {
        match value {
            Separator::Point => DecimalSeparator::Point,
            Separator::Comma => DecimalSeparator::Comma,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate accepted fractal images named after their parameters
    Generate {
        /// Output directory
        #[arg(short, long, env = "CHAOSMETRIC_OUT", default_value = "mandelbrot")]
        out: PathBuf,

        /// Number of images (size of the seed table)
        #[arg(short = 'n', long, default_value_t = DEFAULT_TABLE_SIZE)]
        count: usize,

        /// Numeric RNG seed
        #[arg(short, long, env = "CHAOSMETRIC_SEED", conflicts_with = "passphrase")]
        seed: Option<u64>,

        /// Passphrase hashed into the RNG seed
        #[arg(short, long, env = "CHAOSMETRIC_PASSPHRASE")]
        passphrase: Option<String>,

        #[arg(long, default_value_t = DEFAULT_WIDTH)]
        width: u32,

        #[arg(long, default_value_t = DEFAULT_HEIGHT)]
        height: u32,

        /// Candidates tried per image before it is skipped
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Worker threads (0 = all cores)
        #[arg(short, long, env = "CHAOSMETRIC_WORKERS", default_value_t = 0)]
        workers: usize,

        /// Decimal separator used in file names
        #[arg(long, value_enum, default_value_t = Separator::Point)]
        separator: Separator,
    },
    /// Compare plain images with their ciphertexts
    Evaluate {
        /// Directory of plain images
        #[arg(long)]
        plain: PathBuf,

        /// Directory of encrypted images, matched to plain images by sorted name
        #[arg(long)]
        cipher: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Neighbor correlation and histogram variance averages of a directory
    Texture {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Mean SSIM, Pearson and pixel match between strided image pairs
    Similarity {
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(long, default_value_t = 20)]
        stride: usize,

        #[arg(long)]
        json: bool,
    },
    /// Decode parameter tokens from file names
    Decode {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn load_images(dir: &Path) -> anyhow::Result<Vec<store::LoadedImage>> {
    let (images, skipped) =
        store::load_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    println!("[*] {}: {} images loaded, {} skipped", dir.display(), images.len(), skipped);
    Ok(images)
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chaosmetric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            out,
            count,
            seed,
            passphrase,
            width,
            height,
            max_attempts,
            workers,
            separator,
        } => {
            let config = GeneratorConfig {
                width,
                height,
                table_size: count,
                workers,
                max_attempts,
                ..GeneratorConfig::default()
            };
            let generator = FractalGenerator::new(config)?;

            let sampler_seed = match (seed, passphrase) {
                (Some(seed), _) => SamplerSeed::Numeric(seed),
                (None, Some(passphrase)) => SamplerSeed::Passphrase(passphrase),
                (None, None) => SamplerSeed::Entropy,
            };
            let mut rng = sampler_seed.rng();
            let table = generator.sample_table(&mut rng);

            println!("[*] Generating {} images of {}x{} into {}", table.len(), width, height, out.display());
            let codec = ViewCodec::new(separator.into());
            let summary = generator.run(&table, &mut rng, &out, &codec)?;

            println!(
                "[✓] {} accepted, {} skipped, {} candidates rendered",
                summary.accepted,
                summary.skipped.len(),
                summary.attempts
            );
            if !summary.skipped.is_empty() {
                println!("[!] Skipped indices: {:?}", summary.skipped);
            }
        }

        Commands::Evaluate { plain, cipher, json } => {
            let plain = load_images(&plain)?;
            let cipher = load_images(&cipher)?;
            let report = SuiteReport::evaluate(&plain, &cipher);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }

        Commands::Texture { dir, json } => {
            let images = load_images(&dir)?;
            let texture = average_neighbor_and_variance(&images)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&texture)?);
            } else {
                println!("Mean Rh: {:.6}", texture.rh);
                println!("Mean Rv: {:.6}", texture.rv);
                println!("Mean Rd: {:.6}", texture.rd);
                println!("Mean D:  {:.6}", texture.d);
            }
        }

        Commands::Similarity { dir, stride, json } => {
            let images = load_images(&dir)?;
            let similarity = sampled_similarity(&images, stride)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&similarity)?);
            } else {
                println!("Comparisons:        {}", similarity.comparisons);
                println!("Mean SSIM:          {:.6}", similarity.ssim);
                println!("Mean Pearson:       {:.6}", similarity.pearson);
                println!("Mean pixel match %: {:.6}", similarity.pixel_match);
            }
        }

        Commands::Decode { names } => {
            for name in names {
                // Tokens may carry a directory prefix or an extension.
                match decode_any(&name) {
                    Ok(decoded) => println!("{name}: {}", serde_json::to_string(&decoded)?),
                    Err(e) => eprintln!("[!] {name}: {e}"),
                }
            }
        }
    }

    Ok(())
}
