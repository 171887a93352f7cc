use crate::config::CrawlerConfig;

/// Page-visit budget of one session; it only ever decreases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudget {
    initial: u32,
    remaining: u32,
}

impl PageBudget {
    pub fn new(pages: u32) -> Self {
        Self {
            initial: pages,
            remaining: pages,
        }
    }

    /// Budget for a site given how many golden URLs it already has
    ///
    /// Each golden URL cuts `golden-budget-reduction` pages, never going
    /// below `min-pages-per-site`.
    pub fn for_site(config: &CrawlerConfig, golden_count: usize) -> Self {
        let reduction = config
            .golden_budget_reduction
            .saturating_mul(golden_count.min(u32::MAX as usize) as u32);
        let floor = config.min_pages_per_site.min(config.max_pages_per_site);
        let pages = config
            .max_pages_per_site
            .saturating_sub(reduction)
            .max(floor);
        Self::new(pages)
    }

    /// Takes one page from the budget; false once it is exhausted
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.initial - self.remaining
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
