mod common;

use common::{create_users, ids, run_test};
use lokidb::errors::ErrorKind;
use lokidb::view::RematerializeOptions;
use lokidb::{
    doc, field, Collection, CollectionOptions, DataOptions, Document, DynamicViewOptions,
    SimpleSortOptions, SortCriterion, SortPriority,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[ctor::ctor]
fn init() {
    colog::init();
}

fn view_ids(collection: &mut Collection, name: &str) -> Vec<i64> {
    match collection.dynamic_view_mut(name) {
        Ok(mut view) => ids(&view.data(DataOptions::default())),
        Err(err) => panic!("{}", err),
    }
}

#[test]
fn test_views_track_random_writes() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut collection = Collection::new("scores", CollectionOptions::new().index("score"));
    let criteria = vec![SortCriterion::desc("score"), SortCriterion::asc("$loki")];
    {
        let mut view = collection
            .add_dynamic_view("passive", DynamicViewOptions::new())
            .expect("view");
        view.apply_find(doc! { score: { "$gte": 5 } }, None).expect("find");
        view.apply_sort_criteria(criteria.clone());
    }
    {
        let options = DynamicViewOptions::new()
            .persistent(true)
            .sort_priority(SortPriority::Active);
        let mut view = collection.add_dynamic_view("active", options).expect("view");
        view.apply_find(doc! { score: { "$gte": 5 } }, None).expect("find");
        view.apply_sort_criteria(criteria.clone());
    }
    {
        let mut view = collection
            .add_dynamic_view("unsorted", DynamicViewOptions::new())
            .expect("view");
        view.apply_where(|doc| doc.resolve("score").as_i64().is_some_and(|s| s % 2 == 0), None)
            .expect("where");
    }

    for round in 0..200 {
        let count = collection.count();
        match rng.gen_range(0..4) {
            0 | 1 => {
                let score = rng.gen_range(0..10i64);
                collection.insert_one(doc! { score: score }).expect("insert");
            }
            2 if count > 0 => {
                let id = collection.id_index()[rng.gen_range(0..count)];
                let mut doc = collection.get(id).cloned().expect("document");
                doc.put("score", rng.gen_range(0..10i64));
                collection.update(doc).expect("update");
            }
            3 if count > 0 => {
                let id = collection.id_index()[rng.gen_range(0..count)];
                collection.remove(id).expect("remove");
            }
            _ => {}
        }

        let expected = ids(
            &collection
                .chain()
                .find(doc! { score: { "$gte": 5 } })
                .expect("find")
                .compoundsort(&criteria)
                .data(DataOptions::default()),
        );
        assert_eq!(view_ids(&mut collection, "passive"), expected, "passive view, round {}", round);
        assert_eq!(view_ids(&mut collection, "active"), expected, "active view, round {}", round);

        let evens: Vec<i64> = collection
            .documents()
            .iter()
            .filter(|doc| doc.resolve("score").as_i64().is_some_and(|s| s % 2 == 0))
            .filter_map(Document::id)
            .collect();
        assert_eq!(view_ids(&mut collection, "unsorted"), evens, "unsorted view, round {}", round);
    }
}

#[test]
fn test_view_over_users() {
    run_test(create_users, |mut users| {
        {
            let mut view = users.add_dynamic_view("rustaceans", DynamicViewOptions::new())?;
            view.apply_find(doc! { lang: "rust" }, Some("lang"))?;
            view.apply_simple_sort("age", SimpleSortOptions::new());
            assert_eq!(ids(&view.data(DataOptions::default())), vec![3, 5, 1]);
        }

        users.insert_one(doc! { username: "ola", age: 22, lang: "rust" })?;
        let mut jack = users.by("username", "jack")?.cloned().expect("jack");
        jack.put("lang", "rust");
        jack.put("age", 50);
        users.update(jack)?;
        users.find_and_remove(doc! { username: "joe" })?;

        assert_eq!(view_ids(&mut users, "rustaceans"), vec![6, 3, 5, 2]);

        let mut view = users.dynamic_view_mut("rustaceans")?;
        view.apply_find(field("age").lt(40), Some("lang"))?;
        assert_eq!(ids(&view.data(DataOptions::default())), vec![6, 4, 3, 5]);
        assert_eq!(view.remove_filter("missing").unwrap_err().kind(), &ErrorKind::FilterNotFound);
        view.rematerialize(RematerializeOptions::default())?;
        assert_eq!(view.count(), 4);
        Ok(())
    })
}

#[test]
fn test_view_catalog() {
    run_test(create_users, |mut users| {
        users.add_dynamic_view("a", DynamicViewOptions::new())?;
        users.add_dynamic_view("b", DynamicViewOptions::new())?;
        let err = users.add_dynamic_view("a", DynamicViewOptions::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ViewAlreadyExists);
        assert_eq!(users.dynamic_view_names(), vec!["a", "b"]);
        assert!(users.remove_dynamic_view("a"));
        let err = users.dynamic_view_mut("a").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ViewNotFound);
        Ok(())
    })
}
