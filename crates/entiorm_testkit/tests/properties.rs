//! Property tests over generated entities.

use entiorm_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn saved_entities_round_trip(rows in prop::collection::vec(arb_test_table(), 1..6)) {
        for backend in [TestBackend::SessionMemory, TestBackend::MapperMemory, TestBackend::DocumentMemory] {
            let factory = backend.factory();
            let mut saved = rows.clone();
            factory.commit(|ctx| {
                for row in &mut saved {
                    ctx.save(row).unwrap();
                }
            });

            let mut ctx = factory.context();
            for row in &saved {
                let id = row.id;
                let fetched = ctx.get::<TestTable>(|t| t.id == id).unwrap();
                prop_assert_eq!(fetched.as_ref(), Some(row), "{}", backend);
            }
            prop_assert_eq!(ctx.count::<TestTable>(|_| true).unwrap(), rows.len());
        }
    }

    #[test]
    fn update_where_count_matches_predicate(rows in prop::collection::vec(arb_test_table(), 0..8), cut in 0usize..24) {
        let factory = TestBackend::ModelMemory.factory();
        factory.commit(|ctx| {
            for mut row in rows.clone() {
                ctx.save(&mut row).unwrap();
            }
        });

        let expected = rows.iter().filter(|r| r.name.len() <= cut).count();
        let updated = factory.commit(|ctx| {
            ctx.update_where::<TestTable>(|t| t.name.len() <= cut, |t| t.name = "short".into())
                .unwrap()
        });
        prop_assert_eq!(updated, expected);

        let mut ctx = factory.context();
        prop_assert!(ctx.count::<TestTable>(|t| t.name == "short").unwrap() >= expected);
        let deleted = ctx.delete_where::<TestTable>(|t| t.name == "short").unwrap();
        prop_assert!(deleted >= expected);
        prop_assert!(ctx.get::<TestTable>(|t| t.name == "short").unwrap().is_none());
    }
}
