//! Guest cart to account cart and back, over real HTTP.

use clementine_client::cart::MemoryStore;
use clementine_client::{ClientConfig, StorefrontClient};
use clementine_core::{Product, ProductId};
use clementine_integration_tests::{CUSTOMER_AN, StubBackend};
use rust_decimal::Decimal;

fn client_for(stub: &StubBackend) -> StorefrontClient<MemoryStore> {
    let config = ClientConfig::new(stub.base_url().parse().expect("stub url"));
    StorefrontClient::new(config, MemoryStore::new()).expect("client")
}

fn product(id: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Decimal::from(10),
        sale_price: None,
        is_exclusive: false,
        thumbnail: None,
    }
}

#[tokio::test]
async fn login_merges_guest_cart_logout_restores_it() {
    let stub = StubBackend::spawn().await;
    let client = client_for(&stub);

    // Guest fills a cart: kept purely local.
    client.cart().load().await.expect("guest load");
    client.cart().add(&product(1), 2).await.expect("guest add");
    client.cart().add(&product(2), 1).await.expect("guest add");
    assert_eq!(client.cart().count(), 3);

    // Login, then apply the identity transition deterministically (the
    // spawned worker does the same thing asynchronously in production).
    let previous = client.tokens().identity_key();
    client
        .auth()
        .login(CUSTOMER_AN.0, "secret")
        .await
        .expect("login");
    let current = client.tokens().identity_key();
    client
        .transitions()
        .handle(previous.as_deref(), current.as_deref())
        .await
        .expect("login transition");

    // Guest lines now live on the backend and in the working cart.
    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 1), Some(2));
    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 2), Some(1));
    assert_eq!(client.cart().count(), 3);
    assert!(client.cart().items().iter().all(|line| line.item_id.is_some()));

    // An authenticated mutation syncs remotely.
    client
        .cart()
        .set_quantity(ProductId::new(1), 5)
        .await
        .expect("update");
    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 1), Some(5));

    // Logout: the account cart stays remote, the local cart becomes the
    // (now empty) guest cart again.
    let previous = client.tokens().identity_key();
    client.auth().logout().await;
    client
        .transitions()
        .handle(previous.as_deref(), None)
        .await
        .expect("logout transition");

    assert!(client.cart().items().is_empty());
    assert!(client.cart().is_loaded());
    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 1), Some(5));
}

#[tokio::test]
async fn relogin_restores_the_account_cart() {
    let stub = StubBackend::spawn().await;
    let client = client_for(&stub);

    client.cart().load().await.expect("guest load");
    client.cart().add(&product(3), 4).await.expect("guest add");

    let previous = client.tokens().identity_key();
    client
        .auth()
        .login(CUSTOMER_AN.0, "secret")
        .await
        .expect("login");
    client
        .transitions()
        .handle(previous.as_deref(), client.tokens().identity_key().as_deref())
        .await
        .expect("login transition");

    let previous = client.tokens().identity_key();
    client.auth().logout().await;
    client
        .transitions()
        .handle(previous.as_deref(), None)
        .await
        .expect("logout transition");
    assert!(client.cart().items().is_empty());

    // Second login: the empty guest cart merges as a no-op and the account
    // cart comes back from the backend.
    client
        .auth()
        .login(CUSTOMER_AN.0, "secret")
        .await
        .expect("re-login");
    client
        .transitions()
        .handle(None, client.tokens().identity_key().as_deref())
        .await
        .expect("re-login transition");

    assert_eq!(client.cart().count(), 4);
    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 3), Some(4));
}

#[tokio::test]
async fn background_worker_applies_transitions() {
    let stub = StubBackend::spawn().await;
    let client = client_for(&stub);
    let _worker = client.spawn_transitions();

    client.cart().load().await.expect("guest load");
    client.cart().add(&product(9), 1).await.expect("guest add");

    client
        .auth()
        .login(CUSTOMER_AN.0, "secret")
        .await
        .expect("login");

    // Wait for the worker to drain the identity event and run the merge.
    for _ in 0..50 {
        if stub.state.cart_quantity(CUSTOMER_AN.1, 9) == Some(1) && client.cart().is_loaded() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(stub.state.cart_quantity(CUSTOMER_AN.1, 9), Some(1));
    assert_eq!(client.cart().count(), 1);
}
