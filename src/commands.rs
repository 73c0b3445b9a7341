use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::app::content_api::HttpContentApi;
use crate::app::page_cache::{LocalFsPageCache, PageCache as _};
use crate::app::prefetch::Prefetcher;
use crate::app::queue::BackgroundQueue;
use crate::app::resolver::{PageContentResolver, ResolveOutcome, ResolvedPage};
use crate::app::session::BookSession;
use crate::cli::{
    CacheBookArgs, CacheSweepArgs, FetchTocArgs, FlattenArgs, OutlineArgs, ReadArgs,
};
use crate::config::ReaderConfig;
use crate::flat::FlatModel;

pub fn flatten(args: FlattenArgs) -> anyhow::Result<()> {
    let model = load_local_model(&args.toc, &args.book_id)?;
    write_json_output(args.out.as_deref(), &model)
}

pub fn outline(args: OutlineArgs) -> anyhow::Result<()> {
    let model = load_local_model(&args.toc, &args.book_id)?;
    print!("{}", render_outline(&model));
    Ok(())
}

pub async fn fetch_toc(config: &ReaderConfig, args: FetchTocArgs) -> anyhow::Result<()> {
    let api = Arc::new(HttpContentApi::from_config(config)?);
    let session = BookSession::new(args.book_id, api);
    let model = session.load().await?;
    write_json_output(args.out.as_deref(), model.as_ref())
}

pub async fn read(config: &ReaderConfig, args: ReadArgs) -> anyhow::Result<()> {
    let api = Arc::new(HttpContentApi::from_config(config)?);
    let cache = Arc::new(LocalFsPageCache::new(&config.cache_dir));
    let session = BookSession::new(args.book_id, api.clone());
    let model = session.load().await?;

    let resolver = PageContentResolver::new(api.clone(), cache.clone());
    let resolved = match resolver.resolve(&model, args.page).await? {
        ResolveOutcome::Ready(resolved) => resolved,
        ResolveOutcome::Superseded => anyhow::bail!("page {} was superseded", args.page),
    };

    let out = match &resolved {
        ResolvedPage::Structural(item) => serde_json::json!({
            "page": item,
            "breadcrumb": model.breadcrumb(item.page),
        }),
        ResolvedPage::Content {
            page,
            content,
            from_cache,
        } => serde_json::json!({
            "page": page,
            "breadcrumb": model.breadcrumb(page.page),
            "content": content,
            "fromCache": from_cache,
        }),
    };
    write_json_output(None, &out)?;

    if args.prefetch {
        let prefetcher = Prefetcher::new(
            api,
            cache,
            BackgroundQueue::new(config.prefetch_concurrency),
        );
        let handles = prefetcher.schedule_ahead(&model, args.page, config.prefetch_count);
        let scheduled = handles.len();
        for handle in handles {
            handle.await.context("join prefetch task")?;
        }
        tracing::info!(scheduled, "prefetch finished");
    }
    Ok(())
}

pub async fn cache_sweep(config: &ReaderConfig, args: CacheSweepArgs) -> anyhow::Result<()> {
    let days = args.days.unwrap_or(config.cache_max_age_days);
    let cache = LocalFsPageCache::new(&config.cache_dir);
    let removed = cache
        .invalidate_older_than(chrono::Duration::days(i64::from(days)))
        .await?;
    println!("removed {removed} cached page(s) older than {days} day(s)");
    Ok(())
}

pub async fn cache_clear(config: &ReaderConfig, args: CacheBookArgs) -> anyhow::Result<()> {
    let cache = LocalFsPageCache::new(&config.cache_dir);
    let removed = cache.clear_book(&args.book_id).await?;
    println!("removed {removed} cached page(s) for book {}", args.book_id);
    Ok(())
}

pub async fn cache_stats(config: &ReaderConfig, args: CacheBookArgs) -> anyhow::Result<()> {
    let cache = LocalFsPageCache::new(&config.cache_dir);
    let stats = cache.stats(&args.book_id).await?;
    write_json_output(None, &stats)
}

fn load_local_model(toc_path: &Path, book_id: &str) -> anyhow::Result<FlatModel> {
    let bytes =
        std::fs::read(toc_path).with_context(|| format!("read toc: {}", toc_path.display()))?;
    let doc = crate::toc::parse_document(&bytes)
        .with_context(|| format!("parse toc: {}", toc_path.display()))?;
    crate::toc::flatten(&doc, book_id).context("flatten toc")
}

fn write_json_output<T: serde::Serialize + ?Sized>(
    out: Option<&Path>,
    value: &T,
) -> anyhow::Result<()> {
    let mut data = serde_json::to_string_pretty(value).context("serialize json")?;
    data.push('\n');
    match out {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create dir: {}", parent.display()))?;
            }
            std::fs::write(path, data).with_context(|| format!("write: {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => print!("{data}"),
    }
    Ok(())
}

pub fn render_outline(model: &FlatModel) -> String {
    let mut out = format!(
        "{} ({} pages)\n",
        model.metadata().title,
        model.total_pages()
    );
    for entry in model.toc_entries() {
        let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
        out.push_str(&format!("{:>5}  {indent}{}\n", entry.page, entry.header));
    }
    out
}
