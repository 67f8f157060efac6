use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    Any,
    Rising,
    Falling,
}

impl Edge {
    fn accepts_rising(self) -> bool {
        !matches!(self, Self::Falling)
    }

    fn accepts_falling(self) -> bool {
        !matches!(self, Self::Rising)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized edge mode: {0}")]
pub struct UnknownEdge(pub String);

impl FromStr for Edge {
    type Err = UnknownEdge;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "rising" => Ok(Self::Rising),
            "falling" => Ok(Self::Falling),
            _ => Err(UnknownEdge(s.to_string())),
        }
    }
}

/// What to look for when scanning a channel for level crossings.
#[derive(Debug, Clone, PartialEq)]
pub struct EventOptions {
    pub level: f64,
    pub edge: Edge,
    /// Time in seconds at which to start scanning
    pub start: Option<f64>,
    /// Time in seconds at which to stop scanning
    pub stop: Option<f64>,
    /// Maximum number of events; `None` or zero for no limit
    pub count: Option<usize>,
    /// Samples a new level must persist before the crossing counts
    pub debounce: usize,
    /// Number of derivatives taken before scanning
    pub diff: usize,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            level: 0.0,
            edge: Edge::Any,
            start: None,
            stop: None,
            count: None,
            debounce: 1,
            diff: 0,
        }
    }
}

impl EventOptions {
    pub fn crossing(level: f64) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn rising(mut self) -> Self {
        self.edge = Edge::Rising;
        self
    }

    pub fn falling(mut self) -> Self {
        self.edge = Edge::Falling;
        self
    }

    pub fn any_edge(mut self) -> Self {
        self.edge = Edge::Any;
        self
    }

    pub fn starting_at(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn stopping_at(mut self, stop: f64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn debounce(mut self, debounce: usize) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn derivative(mut self, diff: usize) -> Self {
        self.diff = diff;
        self
    }
}

/// Debounced edge detection over a sequence of level tests.
///
/// A run of identical tests is confirmed once it reaches `debounce` samples.
/// When a confirmed run follows a confirmed run of the opposite level, an
/// edge is reported at the first index of the new run. Shorter excursions
/// are ignored, so `lllglggg` is one rising edge (at the final run of `g`)
/// and `lllgglll` is none at a debounce of 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDetector {
    edge: Edge,
    debounce: usize,
    count: Option<usize>,
}

impl EventDetector {
    pub fn new(edge: Edge, debounce: usize, count: Option<usize>) -> Self {
        Self {
            edge,
            debounce: debounce.max(1),
            count: count.filter(|count| *count > 0),
        }
    }

    /// Scan `tests` (true = above the level) and return the indices of the
    /// confirmed edges. `first_index` is the index of the first test.
    pub fn scan<I: IntoIterator<Item = bool>>(&self, tests: I, first_index: usize) -> Vec<usize> {
        let mut events = Vec::new();
        let mut last = None;
        let mut run_start = first_index;
        let mut run_length = 0;
        let mut confirmed: Option<bool> = None;

        for (index, test) in (first_index..).zip(tests) {
            if last == Some(test) {
                run_length += 1;
            } else {
                last = Some(test);
                run_start = index;
                run_length = 1;
            }

            if run_length < self.debounce || confirmed == Some(test) {
                continue;
            }
            if confirmed.is_some() {
                let accepted = if test {
                    self.edge.accepts_rising()
                } else {
                    self.edge.accepts_falling()
                };
                if accepted {
                    events.push(run_start);
                }
            }
            confirmed = Some(test);

            if self.count.is_some_and(|count| events.len() >= count) {
                break;
            }
        }
        events
    }
}

impl From<&EventOptions> for EventDetector {
    fn from(options: &EventOptions) -> Self {
        Self::new(options.edge, options.debounce, options.count)
    }
}

/// Take the `order`-th finite difference of `values`, scaled to a
/// derivative per second at `samplehz`. The result is `order` samples shorter.
pub fn differentiate(values: &[f64], order: usize, samplehz: f64) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..order {
        out = out.windows(2).map(|pair| pair[1] - pair[0]).collect();
    }
    let scale = samplehz.powi(order as i32);
    out.iter_mut().for_each(|value| *value *= scale);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `l` below the level, `g` above it
    fn pattern(text: &str) -> Vec<bool> {
        text.chars().map(|c| c == 'g').collect()
    }

    fn scan(text: &str, edge: Edge, debounce: usize) -> Vec<usize> {
        EventDetector::new(edge, debounce, None).scan(pattern(text), 0)
    }

    #[test]
    fn test_single_rising_edge() {
        assert_eq!(scan("lllggg", Edge::Any, 3), vec![3]);
        assert_eq!(scan("lllglggg", Edge::Any, 3), vec![5]);
        assert_eq!(scan("lllggllggllggg", Edge::Any, 3), vec![11]);
    }

    #[test]
    fn test_short_excursions_are_ignored() {
        assert_eq!(scan("lllgglll", Edge::Any, 3), Vec::<usize>::new());
        assert_eq!(scan("lllgllgllglll", Edge::Any, 3), Vec::<usize>::new());
    }

    #[test]
    fn test_edge_modes() {
        let text = "llggllll";
        assert_eq!(scan(text, Edge::Any, 1), vec![2, 4]);
        assert_eq!(scan(text, Edge::Rising, 1), vec![2]);
        assert_eq!(scan(text, Edge::Falling, 1), vec![4]);
    }

    #[test]
    fn test_debounce_zero_is_unfiltered() {
        assert_eq!(scan("lgl", Edge::Any, 0), vec![1, 2]);
    }

    #[test]
    fn test_count_limit() {
        let detector = EventDetector::new(Edge::Any, 1, Some(2));
        assert_eq!(detector.scan(pattern("lglglg"), 0), vec![1, 2]);

        let unlimited = EventDetector::new(Edge::Any, 1, Some(0));
        assert_eq!(unlimited.scan(pattern("lglglg"), 0), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_first_index_offsets_events() {
        let detector = EventDetector::new(Edge::Rising, 2, None);
        assert_eq!(detector.scan(pattern("llgg"), 10), vec![12]);
    }

    #[test]
    fn test_initial_level_is_not_an_edge() {
        assert_eq!(scan("gggl", Edge::Any, 1), vec![3]);
        assert_eq!(scan("gggg", Edge::Any, 1), Vec::<usize>::new());
    }

    #[test]
    fn test_edge_from_str() {
        assert_eq!("Rising".parse::<Edge>(), Ok(Edge::Rising));
        assert_eq!("falling".parse::<Edge>(), Ok(Edge::Falling));
        assert_eq!("ANY".parse::<Edge>(), Ok(Edge::Any));
        assert_eq!("up".parse::<Edge>(), Err(UnknownEdge("up".to_string())));
    }

    #[test]
    fn test_differentiate() {
        let y = [0.0, 1.0, 4.0, 9.0, 16.0];
        let first = differentiate(&y, 1, 10.0);
        assert_eq!(first.len(), 4);
        assert_relative_eq!(first[0], 10.0);
        assert_relative_eq!(first[3], 70.0);

        let second = differentiate(&y, 2, 10.0);
        assert_eq!(second.len(), 3);
        for value in second {
            assert_relative_eq!(value, 200.0);
        }

        assert_eq!(differentiate(&y, 0, 10.0), y.to_vec());
    }

    #[test]
    fn test_options_builder() {
        let options = EventOptions::crossing(1.5)
            .falling()
            .starting_at(0.5)
            .stopping_at(2.0)
            .limit(3)
            .debounce(4)
            .derivative(1);
        assert_eq!(options.level, 1.5);
        assert_eq!(options.edge, Edge::Falling);
        assert_eq!(options.start, Some(0.5));
        assert_eq!(options.stop, Some(2.0));
        assert_eq!(options.count, Some(3));
        assert_eq!(options.debounce, 4);
        assert_eq!(options.diff, 1);
        assert_eq!(
            EventDetector::from(&options),
            EventDetector::new(Edge::Falling, 4, Some(3))
        );
    }
}
