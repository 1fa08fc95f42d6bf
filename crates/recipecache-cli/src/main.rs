//! recipecache - search the recipe catalog from the terminal.
//!
//! Every lookup goes through the local cache first, so previously seen
//! recipes stay available when the catalog is unreachable.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recipecache_core::{
    is_exhaustion, ApiClient, Config, Recipe, RecipeCache, RecipeRepository, Resource,
    SearchController,
};

// ============================================================================
// Constants
// ============================================================================

const USAGE: &str = "\
Usage:
  recipecache search [QUERY] [--pages N]   Search the catalog (defaults to the last query)
  recipecache recipe <ID>                  Show one recipe with its ingredients
  recipecache --cache-age                  Show when the local cache was last written";

/// Pages fetched per search unless `--pages` says otherwise
const DEFAULT_PAGES: u32 = 1;

enum Command {
    Search { query: Option<String>, pages: u32 },
    Recipe { recipe_id: String },
    CacheAge,
    Help,
}

/// Initialize the tracing subscriber for logging.
///
/// Log lines go to stderr through a non-blocking writer so they never
/// interleave with results printed to stdout. The returned guard flushes
/// pending lines when dropped.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };

    match first.as_str() {
        "--cache-age" => Ok(Command::CacheAge),
        "-h" | "--help" | "help" => Ok(Command::Help),
        "recipe" => match args.get(1) {
            Some(id) => Ok(Command::Recipe {
                recipe_id: id.clone(),
            }),
            None => bail!("recipe: missing recipe id\n\n{}", USAGE),
        },
        "search" => {
            let mut query_words = Vec::new();
            let mut pages = DEFAULT_PAGES;
            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                if arg == "--pages" {
                    let value = rest.next().context("--pages needs a value")?;
                    pages = value
                        .parse()
                        .with_context(|| format!("Invalid page count: {}", value))?;
                } else {
                    query_words.push(arg.as_str());
                }
            }
            let query = (!query_words.is_empty()).then(|| query_words.join(" "));
            Ok(Command::Search {
                query,
                pages: pages.max(1),
            })
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if let Command::Help = command {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let cache = Arc::new(RecipeCache::open(cache_dir)?.with_page_size(config.page_size()));

    if let Command::CacheAge = command {
        match cache.cache_age() {
            Some(age) => println!("Cache written {} ({} recipes)", age, cache.len()),
            None => println!("No cached recipes"),
        }
        return Ok(());
    }

    let api = ApiClient::from_config(&config)?;
    info!(base_url = %api.base_url(), "recipecache starting");
    let repository = RecipeRepository::new(Arc::clone(&cache), Arc::new(api), config.refresh_threshold());

    match command {
        Command::Search { query, pages } => {
            let query = query
                .or_else(|| config.last_query.clone())
                .context("search: no query given and no previous query saved")?;

            config.last_query = Some(query.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save last query");
            }

            run_search(repository, &query, pages, cache.page_size()).await
        }
        Command::Recipe { recipe_id } => show_recipe(&repository, &recipe_id).await,
        Command::CacheAge | Command::Help => Ok(()),
    }
}

/// Page through results until `pages` pages were shown or the query ran out.
async fn run_search(repository: RecipeRepository, query: &str, pages: u32, page_size: usize) -> Result<()> {
    let mut controller = SearchController::new(repository);
    let mut results = controller.subscribe_recipes();

    controller.search(query);
    loop {
        while controller.is_attached() {
            controller.process_next().await;
        }

        let offset = (controller.page_number() as usize - 1) * page_size;
        for state in results.drain() {
            match state {
                Resource::Loading(None) => {
                    eprintln!("Searching {:?}, page {}...", query, controller.page_number());
                }
                Resource::Loading(Some(_)) => {}
                Resource::Success(recipes) => print_results(&recipes, offset),
                exhausted if is_exhaustion(&exhausted) => {
                    eprintln!("No more results for {:?}", query);
                    return Ok(());
                }
                Resource::Error { message, data } => {
                    if let Some(cached) = data.filter(|d| !d.is_empty()) {
                        eprintln!("Showing cached results:");
                        print_results(&cached, offset);
                    }
                    bail!("Search failed: {}", message);
                }
            }
        }

        if controller.page_number() >= pages || !controller.next_page() {
            return Ok(());
        }
    }
}

async fn show_recipe(repository: &RecipeRepository, recipe_id: &str) -> Result<()> {
    let mut states = repository.get_recipe(recipe_id);
    while let Some(state) = states.next().await {
        match state {
            Resource::Loading(Some(cached)) => {
                eprintln!("Refreshing cached copy of {:?}...", cached.title);
            }
            Resource::Loading(None) => continue,
            Resource::Success(recipe) => {
                print_recipe(&recipe);
                return Ok(());
            }
            Resource::Error { message, data } => {
                if let Some(cached) = data {
                    eprintln!("Could not refresh recipe, showing cached copy");
                    print_recipe(&cached);
                    return Ok(());
                }
                bail!("Recipe {} unavailable: {}", recipe_id, message);
            }
        }
    }
    bail!("Recipe lookup for {} ended without a result", recipe_id)
}

fn print_results(recipes: &[Recipe], offset: usize) {
    for (i, recipe) in recipes.iter().enumerate() {
        println!(
            "{:>4}. {} ({}) [{}] rank {:.0}",
            offset + i + 1,
            recipe.title,
            recipe.publisher,
            recipe.recipe_id,
            recipe.social_rank
        );
    }
}

fn print_recipe(recipe: &Recipe) {
    println!("{}", recipe.title);
    println!("  by {} - rank {:.0}", recipe.publisher, recipe.social_rank);
    if !recipe.image_url.is_empty() {
        println!("  {}", recipe.image_url);
    }
    if recipe.ingredients.is_empty() {
        println!("  (no ingredients listed)");
    } else {
        println!();
        for ingredient in &recipe.ingredients {
            println!("  - {}", ingredient);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_search_with_pages() {
        match parse_args(&args(&["search", "chicken", "soup", "--pages", "3"])).unwrap() {
            Command::Search { query, pages } => {
                assert_eq!(query.as_deref(), Some("chicken soup"));
                assert_eq!(pages, 3);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_search_without_query() {
        match parse_args(&args(&["search"])).unwrap() {
            Command::Search { query, pages } => {
                assert!(query.is_none());
                assert_eq!(pages, DEFAULT_PAGES);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["recipe"])).is_err());
        assert!(parse_args(&args(&["search", "x", "--pages", "many"])).is_err());
        assert!(parse_args(&args(&["bake"])).is_err());
        assert!(matches!(parse_args(&[]).unwrap(), Command::Help));
        assert!(matches!(parse_args(&args(&["--cache-age"])).unwrap(), Command::CacheAge));
    }
}
