pub mod crawl;
pub mod http_fetcher;
pub mod page_fetcher;
pub mod render_fetcher;

pub use crawl::extract_detail_links;
pub use page_fetcher::PageFetcher;
