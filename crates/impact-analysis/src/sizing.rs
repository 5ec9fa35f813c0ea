use impact_core::ChartSide;
use tokio::sync::watch;

use crate::layout::ContainerSize;

/// Source of the live pixel size of each chart region
pub trait ContainerSizeSource: Send + Sync {
    /// Latest known size, `None` until the region has been measured
    fn observe(&self, side: ChartSide) -> Option<ContainerSize>;

    /// Change notifications for one region
    fn subscribe(&self, side: ChartSide) -> watch::Receiver<Option<ContainerSize>>;
}

/// Watch-channel backed size feed, one channel per chart side
#[derive(Debug)]
pub struct ContainerSizes {
    positive: watch::Sender<Option<ContainerSize>>,
    negative: watch::Sender<Option<ContainerSize>>,
}

impl Default for ContainerSizes {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerSizes {
    pub fn new() -> Self {
        Self {
            positive: watch::channel(None).0,
            negative: watch::channel(None).0,
        }
    }

    fn sender(&self, side: ChartSide) -> &watch::Sender<Option<ContainerSize>> {
        match side {
            ChartSide::Positive => &self.positive,
            ChartSide::Negative => &self.negative,
        }
    }

    /// Record a measurement; subscribers are woken only on an actual change
    pub fn report(&self, side: ChartSide, size: ContainerSize) {
        let changed = self.sender(side).send_if_modified(|current| {
            if *current == Some(size) {
                return false;
            }
            *current = Some(size);
            true
        });
        if changed {
            tracing::debug!(
                "{} chart resized to {}x{}",
                side.as_str(),
                size.width,
                size.height
            );
        }
    }

    /// Forget a region's size, e.g. when it is unmounted
    pub fn clear(&self, side: ChartSide) {
        self.sender(side).send_if_modified(|current| current.take().is_some());
    }
}

impl ContainerSizeSource for ContainerSizes {
    fn observe(&self, side: ChartSide) -> Option<ContainerSize> {
        *self.sender(side).borrow()
    }

    fn subscribe(&self, side: ChartSide) -> watch::Receiver<Option<ContainerSize>> {
        self.sender(side).subscribe()
    }
}
