use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stockpilot_analysis::{ConsumptionAnalysis, Evidence, RootCause};
use stockpilot_core::{Priority, SubjectId};
use stockpilot_planning::{PlanRequest, ReplenishmentPlanner};

fn bench_plan(c: &mut Criterion) {
    let request = PlanRequest {
        subject_id: SubjectId::new(),
        subject_name: "portland cement".to_string(),
        current_stock: 3,
        priority: Priority::Critical,
        root_cause: RootCause::DemandSurge,
        evidence: Evidence {
            consumption: ConsumptionAnalysis {
                recent_daily_average: 16.0,
                historical_daily_average: 10.0,
                change_percentage: 60.0,
                indicates_surge: true,
                data_available: true,
                recent_order_count: 12,
                historical_order_count: 30,
                ..Default::default()
            },
            ..Default::default()
        },
    };

    let planner = ReplenishmentPlanner::new();
    let now = Utc::now();

    c.bench_function("plan_critical_demand_surge", |b| {
        b.iter(|| planner.plan(black_box(&request), black_box(now)))
    });
}

criterion_group!(benches, bench_plan);
criterion_main!(benches);
