//! Builds indexed columns for a synthetic set of trades and compares indexed queries against plain
//! scans.
use std::fmt;

use clap::Parser;
use color_eyre::eyre::ensure;
use rand::prelude::*;
use splitmap::{
    reducers, CircuitEvaluator, Container, DoubleColumn, DoubleColumnWriter, FairRangePartitioner,
    KeyLayout, PageWriter, SplitMap,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of generated trades.
    #[clap(short, long, default_value = "1000000")]
    trades: u32,
    /// Number of distinct instruments.
    #[clap(short, long, default_value = "100")]
    instruments: usize,
    /// Number of distinct currencies.
    #[clap(short, long, default_value = "10")]
    currencies: usize,
    /// Number of parallel units, defaults to the size of rayon's thread pool.
    #[clap(short, long)]
    partitions: Option<usize>,
    /// Seed of the trade generator.
    #[clap(short, long, default_value = "0")]
    seed: u64,
    /// Key containers by the plain high part of each row instead of scattering them.
    #[clap(long)]
    identity_layout: bool,
}

struct Trade {
    price: f64,
    qty: f64,
    instrument: usize,
    currency: usize,
}

struct Sep(char, usize);

impl fmt::Display for Sep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.1 {
            write!(f, "{}", self.0)?;
        }
        Ok(())
    }
}

fn sep(c: char, len: usize) -> Sep {
    Sep(c, len)
}

fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let start = quanta::Instant::now();
    let result = f();
    log::info!("{name} took {:?}", start.elapsed());
    result
}

fn check(name: &str, indexed: f64, scanned: f64) -> color_eyre::Result<()> {
    let tolerance = 1e-6 * scanned.abs().max(1.0);
    ensure!(
        (indexed - scanned).abs() <= tolerance,
        "{name}: indexed result {indexed} differs from scanned result {scanned}"
    );
    log::info!("{name} = {indexed}");
    Ok(())
}

struct Indexed {
    instruments: Vec<SplitMap>,
    currencies: Vec<SplitMap>,
    price: DoubleColumn,
    qty: DoubleColumn,
}

fn index_trades(trades: &[Trade], args: &Args, layout: KeyLayout) -> Indexed {
    let mut instruments: Vec<PageWriter> =
        (0..args.instruments).map(|_| PageWriter::new(layout)).collect();
    let mut currencies: Vec<PageWriter> =
        (0..args.currencies).map(|_| PageWriter::new(layout)).collect();
    let mut price = DoubleColumnWriter::new(layout);
    let mut qty = DoubleColumnWriter::new(layout);

    for (row, trade) in (0u32..).zip(trades) {
        instruments[trade.instrument].add(row);
        currencies[trade.currency].add(row);
        price.add(row, trade.price);
        qty.add(row, trade.qty);
    }

    Indexed {
        instruments: instruments.into_iter().map(PageWriter::finish).collect(),
        currencies: currencies.into_iter().map(PageWriter::finish).collect(),
        price: price.finish(),
        qty: qty.finish(),
    }
}

fn main() -> color_eyre::Result<()> {
    let args = Args::parse();
    color_eyre::install()?;
    splitmap_logger::setup();

    ensure!(args.instruments > 0, "at least one instrument is required");
    ensure!(args.currencies > 1, "at least two currencies are required");

    let partitioner = args
        .partitions
        .map_or_else(FairRangePartitioner::available, FairRangePartitioner::from);
    let evaluator = CircuitEvaluator::new().parallelism(partitioner);
    let layout = if args.identity_layout {
        KeyLayout::Identity
    } else {
        KeyLayout::Scattered
    };
    log::info!("{:?}", args);
    log::info!("using {} parallel units", partitioner.units());

    log::info!("{} generating trades {0}", sep('=', 6));
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let trades: Vec<Trade> = timed("generating", || {
        (0..args.trades)
            .map(|_| Trade {
                price: rng.gen_range(1.0..100.0),
                qty: f64::from(rng.gen_range(1..1000u32)),
                instrument: rng.gen_range(0..args.instruments),
                currency: rng.gen_range(0..args.currencies),
            })
            .collect()
    });

    log::info!("{} indexing {0}", sep('=', 6));
    let indexed = timed("indexing", || index_trades(&trades, &args, layout));

    let instrument = rng.gen_range(0..args.instruments);
    let currency = rng.gen_range(0..args.currencies);
    let other_currency = (currency + 1) % args.currencies;
    log::info!("instrument {instrument}, currencies {currency} and {other_currency}");

    log::info!("{} notional of one instrument {0}", sep('=', 6));
    let filter = &indexed.instruments[instrument];
    let notional = timed("indexed", || {
        reducers::sum_product(filter, &indexed.price, &indexed.qty, partitioner)
    });
    let scanned: f64 = timed("scan", || {
        trades
            .iter()
            .filter(|trade| trade.instrument == instrument)
            .map(|trade| trade.price * trade.qty)
            .sum()
    });
    check("notional", notional, scanned)?;

    log::info!("{} instrument xor currency {0}", sep('=', 6));
    let xor = timed("circuit", || {
        evaluator.evaluate_split_maps(
            |slice| Container::symmetric_difference(&slice[0], &slice[1]),
            &[
                ("instrument", filter),
                ("currency", &indexed.currencies[currency]),
            ],
        )
    });
    let notional = timed("indexed", || {
        reducers::sum_product(&xor, &indexed.price, &indexed.qty, partitioner)
    });
    let scanned: f64 = timed("scan", || {
        trades
            .iter()
            .filter(|trade| (trade.instrument == instrument) != (trade.currency == currency))
            .map(|trade| trade.price * trade.qty)
            .sum()
    });
    check("notional", notional, scanned)?;

    log::info!("{} instrument or currency {0}", sep('=', 6));
    let or = timed("circuit", || {
        evaluator.evaluate_split_maps(
            |slice| Container::union(&slice[0], &slice[1]),
            &[
                ("instrument", filter),
                ("currency", &indexed.currencies[currency]),
            ],
        )
    });
    let quantity = timed("indexed", || reducers::sum(&or, &indexed.qty, partitioner));
    let matches = |trade: &&Trade| trade.instrument == instrument || trade.currency == currency;
    let scanned: f64 = timed("scan", || trades.iter().filter(matches).map(|t| t.qty).sum());
    check("quantity", quantity, scanned)?;

    let stats = timed("indexed", || {
        reducers::correlation_stats(&or, &indexed.price, &indexed.qty, partitioner)
    });
    let mut expected = reducers::CorrelationStats::default();
    timed("scan", || {
        expected.extend(trades.iter().filter(matches).map(|t| (t.price, t.qty)))
    });
    check("count", stats.count, expected.count)?;
    check("pmcc", stats.pmcc(), expected.pmcc())?;

    log::info!("{} instrument without either currency {0}", sep('=', 6));
    let difference = timed("circuit", || {
        evaluator.evaluate_split_maps(
            |slice| {
                let currencies = Container::union(&slice[1], &slice[2]);
                let outside = Container::symmetric_difference(&slice[0], &currencies);
                Container::intersection(&outside, &slice[0])
            },
            &[
                (0, filter),
                (1, &indexed.currencies[currency]),
                (2, &indexed.currencies[other_currency]),
            ],
        )
    });
    let scanned = trades
        .iter()
        .filter(|trade| {
            trade.instrument == instrument
                && trade.currency != currency
                && trade.currency != other_currency
        })
        .count();
    check("trades", difference.cardinality() as f64, scanned as f64)?;
    log::info!(
        "{} of {} containers kept",
        difference.index().len(),
        filter.index().len()
    );

    Ok(())
}
