#![allow(non_snake_case)]

use alloy::primitives::U256;
use booster_client::{
    BoosterType,
    error::{
        PurchaseError,
        PurchaseStep,
    },
    gateway::Session,
    test_helpers::{
        MockWallet,
        TestContext,
    },
};

#[tokio::test]
async fn has_enough_tokens__reports_shortfall() {
    // given
    let ctx = TestContext::new(50, 0, &[("epic", 200)]);
    let service = ctx.service();

    // when
    let check = service
        .has_enough_tokens(&TestContext::alice_session(), &BoosterType::new("epic").unwrap())
        .await
        .unwrap();

    // then
    assert!(!check.has_enough);
    assert_eq!(check.balance, U256::from(50u64));
    assert_eq!(check.price, U256::from(200u64));
    assert_eq!(
        serde_json::to_value(&check).unwrap(),
        serde_json::json!({ "hasEnough": false, "balance": "50", "price": "200" })
    );
}

#[tokio::test]
async fn has_enough_tokens__exact_balance_is_enough() {
    // given
    let ctx = TestContext::new(200, 0, &[("epic", 200)]);
    let service = ctx.service();

    // when
    let check = service
        .has_enough_tokens(&TestContext::alice_session(), &BoosterType::new("epic").unwrap())
        .await
        .unwrap();

    // then
    assert!(check.has_enough);
}

#[tokio::test]
async fn has_enough_tokens__makes_no_writes() {
    // given
    let ctx = TestContext::new(500, 0, &[("common", 100)]);
    let service = ctx.service();

    // when
    service
        .has_enough_tokens(&TestContext::alice_session(), &BoosterType::new("common").unwrap())
        .await
        .unwrap();

    // then
    assert_eq!(ctx.token.balance_calls.count(), 1);
    assert_eq!(ctx.booster.price_calls.count(), 1);
    assert_eq!(ctx.token.approve_calls.count(), 0);
    assert_eq!(ctx.booster.purchase_calls.count(), 0);
    assert_eq!(ctx.nft.mint_calls.count(), 0);
}

#[tokio::test]
async fn has_enough_tokens__requires_wallet() {
    // given
    let ctx = TestContext::new(500, 0, &[("common", 100)]);
    let service = ctx.service();

    // when
    let result = service
        .has_enough_tokens(
            &Session::<MockWallet>::without_wallet(),
            &BoosterType::new("common").unwrap(),
        )
        .await;

    // then
    assert!(matches!(result, Err(PurchaseError::WalletUnavailable)));
    assert_eq!(ctx.chain_calls(), 0);
}

#[tokio::test]
async fn has_enough_tokens__surfaces_balance_read_failure() {
    // given
    let mut ctx = TestContext::new(500, 0, &[("common", 100)]);
    ctx.token.fail_reads = true;
    let service = ctx.service();

    // when
    let result = service
        .has_enough_tokens(&TestContext::alice_session(), &BoosterType::new("common").unwrap())
        .await;

    // then
    assert!(matches!(
        result,
        Err(PurchaseError::ContractCallFailed {
            step: PurchaseStep::ReadBalance,
            ..
        })
    ));
}
