#[cfg(test)]
mod tests {
    use ferry_core::{
        Combinators, DbError, Deferred, DeferredAware, Eager, Error, Result, Value, gather,
        is_db_error,
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn later<'a, T: Send + 'a>(value: T) -> Deferred<'a, T> {
        Deferred::pending(async move {
            tokio::task::yield_now().await;
            Ok(value)
        })
    }

    fn sum(values: Vec<i64>) -> Result<i64> {
        Ok(values.into_iter().sum())
    }

    #[tokio::test]
    async fn eager_map() {
        let mapped = Eager
            .map(
                vec![vec![1_i64, 2, 3].into(), vec![10_i64, 20, 30, 40].into()],
                sum,
            )
            .expect("Ready inputs can be mapped");
        assert!(!mapped.is_pending());
        assert_eq!(mapped.await.expect("Already resolved"), [11, 22, 33]);

        let error = Eager
            .map(vec![vec![1_i64].into(), later(vec![2_i64])], sum)
            .expect_err("Eager combinators refuse pending inputs");
        assert!(is_db_error(&error, |e| matches!(e, DbError::Configuration(..))));
    }

    #[tokio::test]
    async fn deferred_aware_map() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mapped = DeferredAware
            .map(
                vec![vec![1_i64, 2].into(), later(vec![5_i64, 6, 7])],
                move |v| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sum(v)
                },
            )
            .expect("Pending inputs are accepted");
        assert!(mapped.is_pending());
        assert_eq!(calls.load(Ordering::SeqCst), 0, "Nothing runs before awaiting");
        assert_eq!(mapped.await.expect("Could not resolve"), [6, 8]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let ready = DeferredAware
            .map(vec![vec![4_i64].into()], sum)
            .expect("Ready inputs can be mapped");
        assert!(!ready.is_pending(), "Ready inputs are mapped synchronously");

        let failing = DeferredAware
            .map(
                vec![Deferred::<Vec<i64>>::pending(async {
                    Err(Error::msg("The rows never came"))
                })],
                sum,
            )
            .expect("The failure shows only when resolving");
        assert!(failing.await.is_err());
    }

    #[tokio::test]
    async fn deferred_aware_zip() {
        let groups = DeferredAware
            .zip(vec![
                vec!["a", "b", "c"].into(),
                later(vec!["x", "y", "z", "w"]),
                vec!["1", "2", "3", "4", "5"].into(),
            ])
            .expect("One input is ready");
        assert_eq!(groups.len(), 3, "The shortest ready input decides the length");
        assert!(!groups[0][0].is_pending());
        assert!(groups[0][1].is_pending());
        let mut resolved = Vec::new();
        for group in groups {
            resolved.push(gather(group).await.expect("Could not resolve").concat());
        }
        assert_eq!(resolved, ["ax1", "by2", "cz3"]);

        let short = DeferredAware
            .zip(vec![vec![1_i64, 2, 3].into(), later(vec![1_i64])])
            .expect("One input is ready");
        let mut short = short.into_iter();
        assert!(gather(short.next().expect("First group")).await.is_ok());
        let error = gather(short.next().expect("Second group"))
            .await
            .expect_err("The pending input has a single element");
        assert!(is_db_error(&error, |e| matches!(e, DbError::IndexOutOfRange(1))));

        let error = DeferredAware
            .zip(vec![later(vec![1_i64]), later(vec![2_i64])])
            .expect_err("At least one input must be ready");
        assert!(format!("{:#}", error).contains("at least one input that is not pending"));
    }

    #[tokio::test]
    async fn eager_zip() {
        assert!(!Eager.accepts_pending());
        assert!(DeferredAware.accepts_pending());
        let groups = Eager
            .zip(vec![vec![1_i64, 2].into(), vec![3_i64, 4, 5].into()])
            .expect("Ready inputs can be zipped");
        let mut values = Vec::new();
        for group in groups {
            values.push(gather(group).await.expect("Already resolved"));
        }
        assert_eq!(values, [[1, 3], [2, 4]]);
        assert!(Eager.zip(vec![later(vec![1_i64])]).is_err());
    }

    #[tokio::test]
    async fn deferred_values() {
        let value: Deferred<'_, Value> = later(Value::Int64(Some(42)));
        let decoded = value.decode::<i64>();
        assert!(decoded.is_pending());
        assert_eq!(decoded.await.expect("Could not decode"), 42);

        let mismatch = Deferred::ready(Value::Varchar(Some("x".into()))).decode::<i64>();
        assert!(mismatch.await.is_err());

        let doubled = Deferred::ready(21_i64).map(|v| Ok(v * 2));
        assert!(!doubled.is_pending());
        assert_eq!(doubled.resolve().await.expect("Already resolved"), 42);

        let ordered = gather(vec![later(1_i64), 2.into(), later(3_i64)])
            .await
            .expect("Could not gather");
        assert_eq!(ordered, [1, 2, 3]);
    }
}
