use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use miam_core::{DeliveryId, Money, OrderId, UserId};
use miam_delivery::{
    CourierWallet, CreditDelivery, EarningsPolicy, EarningsSummary, WalletCommand,
};
use miam_events::execute;

fn wallet_with_credits(count: u32) -> CourierWallet {
    let courier_id = UserId::new();
    let mut wallet = CourierWallet::empty(courier_id);
    let policy = EarningsPolicy::default();
    for i in 0..count {
        let quote = policy.quote((i * 37) % policy.delivery_radius_m).unwrap();
        execute(
            &mut wallet,
            &WalletCommand::Credit(CreditDelivery {
                courier_id,
                delivery_id: DeliveryId::new(),
                order_id: OrderId::new(),
                distance_m: quote.distance_m,
                earning: quote.courier_earning,
                tip: Money::from_cents(i64::from(i % 3) * 100),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }
    wallet
}

fn bench_quote(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery_quote");
    let policy = EarningsPolicy::default();

    group.bench_function("quote_mid_radius", |b| {
        b.iter(|| policy.quote(black_box(12_345)).unwrap());
    });

    group.bench_function("quote_out_of_radius", |b| {
        b.iter(|| policy.quote(black_box(30_000)).is_err());
    });

    group.finish();
}

fn bench_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("earnings_summary");

    for count in [10u32, 100, 1_000, 10_000] {
        let wallet = wallet_with_credits(count);
        let from = Some(Utc::now() - Duration::days(7));
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::new("for_period", count), &wallet, |b, w| {
            b.iter(|| EarningsSummary::for_period(black_box(w), from, None));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_quote, bench_summary);
criterion_main!(benches);
