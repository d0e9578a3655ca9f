//! Terminal progress for `extract`, driven by pipeline progress events.
//!
//! The bar counts records: its length grows as pages are listed and its
//! position advances as records are extracted.

#[cfg(feature = "progress")]
mod bar {
    use std::sync::Arc;

    use chat_archive::{ProgressCallback, ProgressEvent};
    use indicatif::{ProgressBar, ProgressStyle};

    pub struct ExtractionProgress {
        bar: Option<ProgressBar>,
    }

    impl ExtractionProgress {
        pub fn new(enabled: bool) -> Self {
            let bar = enabled.then(|| {
                let bar = ProgressBar::new(0);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            });
            Self { bar }
        }

        pub fn callback(&self) -> Option<ProgressCallback> {
            let bar = self.bar.clone()?;
            Some(Arc::new(move |event: ProgressEvent| match event {
                ProgressEvent::DateStarted { date, total_pages } => {
                    let label = date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "all".to_string());
                    bar.set_message(format!("{label}: {total_pages} pages"));
                }
                ProgressEvent::PageListed { submitted, .. } => {
                    bar.inc_length(submitted as u64);
                }
                ProgressEvent::RecordExtracted { .. } => bar.inc(1),
                ProgressEvent::UploadFinished { .. } => {}
            }))
        }

        pub fn finish(&self) {
            if let Some(bar) = &self.bar {
                bar.finish_and_clear();
            }
        }
    }
}

#[cfg(not(feature = "progress"))]
mod bar {
    use chat_archive::ProgressCallback;

    pub struct ExtractionProgress;

    impl ExtractionProgress {
        pub fn new(_enabled: bool) -> Self {
            Self
        }

        pub fn callback(&self) -> Option<ProgressCallback> {
            None
        }

        pub fn finish(&self) {}
    }
}

pub use bar::ExtractionProgress;

