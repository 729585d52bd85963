//! End-to-end exchange flows against a live PostgreSQL instance.
//!
//! Set TEST_DATABASE_URL to run; the tests skip cleanly when no database is
//! reachable.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use prediction_core::config::{AdminSeedConfig, Config};
use prediction_core::db::models::DbUser;
use prediction_core::db::queries::TradeQueries;
use prediction_core::services::market::NewMarket;
use prediction_core::services::trade::QuoteView;
use prediction_core::{MarketStatus, Page, Platform, Side, TradeRequest};

async fn platform() -> Option<Platform> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("TEST_DATABASE_URL not set, skipping integration test");
            return None;
        }
    };

    let mut config = Config::default();
    config.database.url = url;
    config.database.max_connections = 5;

    match Platform::connect(config).await {
        Ok(platform) => {
            platform.db.run_migrations().await.expect("migrations apply");
            Some(platform)
        }
        Err(_) => {
            println!("database not reachable, skipping integration test");
            None
        }
    }
}

async fn seed_admin(platform: &Platform) -> DbUser {
    let tag = Uuid::new_v4().simple().to_string();
    platform
        .users
        .bootstrap_admin(&AdminSeedConfig {
            email: format!("admin-{tag}@example.com"),
            username: format!("admin_{tag}"),
            password_digest: "$2b$12$test-digest".into(),
            bootstrap_credit: None,
        })
        .await
        .expect("admin seeds")
}

async fn register_trader(platform: &Platform, deposit: Decimal) -> DbUser {
    let tag = Uuid::new_v4().simple().to_string();
    let (user, _wallet) = platform
        .users
        .register(
            &format!("trader-{tag}@example.com"),
            &format!("trader_{tag}"),
            "$2b$12$test-digest",
        )
        .await
        .expect("trader registers");
    if deposit > Decimal::ZERO {
        platform
            .wallets
            .deposit(user.id, deposit)
            .await
            .expect("deposit succeeds");
    }
    user
}

async fn create_active_market(platform: &Platform, admin: &DbUser) -> Uuid {
    let now = Utc::now();
    let market = platform
        .markets
        .create(
            admin,
            NewMarket {
                title: "Integration market".into(),
                description: "end-to-end flow".into(),
                category: "testing".into(),
                image_url: None,
                resolution_source: None,
                liquidity: Some(dec!(1000)),
                start_time: now - Duration::hours(1),
                end_time: now + Duration::days(1),
            },
        )
        .await
        .expect("market created");
    platform
        .markets
        .transition(admin, market.id, MarketStatus::Active)
        .await
        .expect("market activated");
    market.id
}

fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}

#[tokio::test]
async fn full_trade_cycle() {
    let Some(platform) = platform().await else {
        return;
    };

    let admin = seed_admin(&platform).await;
    let trader = register_trader(&platform, dec!(100)).await;
    let market_id = create_active_market(&platform, &admin).await;

    // Non-positive deposits are rejected up front.
    let err = platform.wallets.deposit(trader.id, dec!(0)).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_AMOUNT");

    // First buy: 10 units on YES against a fresh market. The executed cost
    // must match the quoted cost.
    let quote = platform
        .trades
        .quote(
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        )
        .await
        .expect("quote prices");
    let QuoteView::Buy(quoted) = quote else {
        panic!("buy request must produce a buy quote");
    };

    let receipt = platform
        .trades
        .execute(
            &trader,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        )
        .await
        .expect("buy executes");
    assert_eq!(receipt.trade.cost, quoted.total_cost);
    assert_eq!(receipt.trade.shares, quoted.shares);
    assert_close(receipt.balance_after, dec!(90), dec!(0.001));
    assert_close(receipt.trade.cost, dec!(10), dec!(0.001));
    assert_close(receipt.trade.fee, dec!(0.196078), dec!(0.001));
    assert_eq!(receipt.trade.q_yes_before, dec!(0));
    assert_close(receipt.trade.q_yes_after, dec!(19.512697), dec!(0.01));
    assert!(receipt.position.yes_shares > Decimal::ZERO);

    let market = platform.markets.get(market_id).await.expect("market loads");
    assert_eq!(market.market.q_yes, receipt.trade.q_yes_after);
    assert!(market.price_yes > dec!(0.5));

    // Insufficient funds leave no partial state behind.
    let poor = register_trader(&platform, dec!(5)).await;
    let err = platform
        .trades
        .execute(
            &poor,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    let poor_wallet = platform.wallets.get_by_user(poor.id).await.unwrap();
    assert_eq!(poor_wallet.balance, dec!(5));
    assert!(platform
        .trades
        .list_trades(poor.id, Page::default())
        .await
        .unwrap()
        .is_empty());
    let market_after = platform.markets.get(market_id).await.unwrap();
    assert_eq!(market_after.market.q_yes, receipt.trade.q_yes_after);

    // Round-trip: selling every acquired share clears the position and
    // returns the raw cost minus the sell-side fee.
    let shares = receipt.position.yes_shares;
    let sell = platform
        .trades
        .execute(
            &trader,
            market_id,
            Side::Yes,
            TradeRequest::SellByShares { shares },
        )
        .await
        .expect("sell executes");
    assert_eq!(sell.position.yes_shares, Decimal::ZERO);
    assert_eq!(sell.position.avg_yes_price, Decimal::ZERO);
    assert_close(sell.balance_after, dec!(99.607843), dec!(0.005));

    // Buy again so resolution has a winning position to pay.
    let rebuy = platform
        .trades
        .execute(
            &trader,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        )
        .await
        .expect("second buy executes");

    // Trade chain and volume reconcile with market state.
    let conn = platform.db.acquire().await.unwrap();
    let trades = TradeQueries::list_by_market(&conn, market_id, 100, 0)
        .await
        .unwrap();
    let mut volume = Decimal::ZERO;
    for pair in trades.windows(2) {
        assert_eq!(pair[1].q_yes_before, pair[0].q_yes_after);
        assert_eq!(pair[1].q_no_before, pair[0].q_no_after);
    }
    for trade in &trades {
        volume += trade.cost;
    }
    let market = platform.markets.get(market_id).await.unwrap();
    assert_eq!(market.market.volume, volume);
    assert_eq!(
        market.market.q_yes,
        trades.last().unwrap().q_yes_after
    );
    drop(conn);

    // Listing and category surfaces see the market while it is active.
    let active_markets = platform
        .markets
        .list(Page::default(), Some(MarketStatus::Active), Some("testing"))
        .await
        .unwrap();
    assert!(active_markets.iter().any(|m| m.market.id == market_id));
    let categories = platform.markets.list_categories().await.unwrap();
    assert!(categories.iter().any(|c| c == "testing"));

    // The open position counts toward unsettled exposure.
    let exposure = platform
        .analytics
        .unsettled_exposure(&admin, 10)
        .await
        .unwrap();
    assert!(exposure.total >= rebuy.position.yes_shares);

    // Admin credit tops up the underfunded wallet; non-admins are rejected.
    let err = platform
        .wallets
        .admin_credit(&trader, poor_wallet.id, dec!(1), "not allowed")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    platform
        .wallets
        .admin_credit(&admin, poor_wallet.id, dec!(50), "support credit")
        .await
        .unwrap();
    let topped_up = platform.wallets.get_by_user(poor.id).await.unwrap();
    assert_eq!(topped_up.balance, dec!(55));

    // Resolve YES: the trader's winning shares pay one unit each.
    let balance_before_resolution = rebuy.balance_after;
    let (resolved, settled) = platform
        .markets
        .resolve(&admin, market_id, Side::Yes)
        .await
        .expect("market resolves");
    assert_eq!(resolved.status, MarketStatus::Resolved);
    assert_eq!(resolved.outcome, Some(Side::Yes));
    assert!(resolved.resolved_at.is_some());
    assert_eq!(settled, 1);

    let wallet = platform.wallets.get_by_user(trader.id).await.unwrap();
    assert_close(
        wallet.balance,
        balance_before_resolution + rebuy.position.yes_shares,
        dec!(0.000001),
    );

    // Settling again credits nothing.
    let again = platform
        .settlements
        .settle_market(&admin, market_id)
        .await
        .expect("re-settlement runs");
    assert_eq!(again, 0);
    let wallet_after = platform.wallets.get_by_user(trader.id).await.unwrap();
    assert_eq!(wallet_after.balance, wallet.balance);

    // Terminal states reject further transitions.
    let err = platform
        .markets
        .transition(&admin, market_id, MarketStatus::Active)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
    let unchanged = platform.markets.get(market_id).await.unwrap();
    assert_eq!(unchanged.market.status, MarketStatus::Resolved);

    // Trading a resolved market is rejected.
    let err = platform
        .trades
        .execute(
            &trader,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(1) },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MARKET_CLOSED");

    // The ledger chain audits clean after the whole cycle.
    let violations = platform.wallets.audit(wallet.id).await.unwrap();
    assert!(violations.is_empty(), "ledger violations: {violations:?}");

    // Per-user listings reflect the cycle.
    let my_trades = platform
        .trades
        .list_trades(trader.id, Page::default())
        .await
        .unwrap();
    assert_eq!(my_trades.len(), 3);
    let my_positions = platform
        .trades
        .list_positions(trader.id, Page::default())
        .await
        .unwrap();
    assert_eq!(my_positions.len(), 1);
    let ledger = platform
        .wallets
        .list_transactions(trader.id, Page::default())
        .await
        .unwrap();
    assert_eq!(ledger.len(), 5); // deposit, buy, sell, buy, settlement

    // Fee windows nest: today is inside the week and the month.
    let fees = platform.analytics.fee_totals(&admin).await.unwrap();
    assert!(fees.today > Decimal::ZERO);
    assert!(fees.this_week >= fees.today);
    assert!(fees.this_month >= fees.today);
    assert!(fees.all_time >= fees.this_month);

    // Contributor board is sorted by fees, descending.
    let contributors = platform
        .analytics
        .top_fee_contributors(&admin, 50)
        .await
        .unwrap();
    assert!(!contributors.is_empty());
    for pair in contributors.windows(2) {
        assert!(pair[0].total_fees >= pair[1].total_fees);
    }

    // Withdrawing the exact balance leaves zero.
    platform
        .wallets
        .withdraw(trader.id, wallet_after.balance)
        .await
        .expect("full withdrawal succeeds");
    let emptied = platform.wallets.get_by_user(trader.id).await.unwrap();
    assert_eq!(emptied.balance, Decimal::ZERO);

    // Admin analytics stay consistent with the ledger.
    let profit = platform.analytics.platform_profit(&admin).await.unwrap();
    assert!(profit.total_fees > Decimal::ZERO);
    assert_eq!(
        profit.total_profit,
        profit.total_fees + profit.resolved_pnl
    );
    let dashboard = platform.analytics.dashboard(&admin).await.unwrap();
    assert!(dashboard.user_count >= 2);
    assert!(dashboard.trade_count >= 3);
}

#[tokio::test]
async fn resolution_pays_only_the_winning_side() {
    let Some(platform) = platform().await else {
        return;
    };

    let admin = seed_admin(&platform).await;
    let market_id = create_active_market(&platform, &admin).await;
    let yes_holder = register_trader(&platform, dec!(100)).await;
    let no_holder = register_trader(&platform, dec!(100)).await;

    let yes_receipt = platform
        .trades
        .execute(
            &yes_holder,
            market_id,
            Side::Yes,
            TradeRequest::BuyByShares { shares: dec!(50) },
        )
        .await
        .expect("yes buy executes");
    platform
        .trades
        .execute(
            &no_holder,
            market_id,
            Side::No,
            TradeRequest::BuyByShares { shares: dec!(50) },
        )
        .await
        .expect("no buy executes");

    let yes_balance = platform.wallets.get_by_user(yes_holder.id).await.unwrap().balance;
    let no_balance = platform.wallets.get_by_user(no_holder.id).await.unwrap().balance;

    let (_, settled) = platform
        .markets
        .resolve(&admin, market_id, Side::Yes)
        .await
        .expect("resolves to yes");
    assert_eq!(settled, 1);

    let yes_after = platform.wallets.get_by_user(yes_holder.id).await.unwrap().balance;
    let no_after = platform.wallets.get_by_user(no_holder.id).await.unwrap().balance;
    assert_eq!(yes_after, yes_balance + yes_receipt.position.yes_shares);
    assert_eq!(no_after, no_balance);
}

#[tokio::test]
async fn concurrent_buys_serialize_on_one_market() {
    let Some(platform) = platform().await else {
        return;
    };

    let admin = seed_admin(&platform).await;
    let market_id = create_active_market(&platform, &admin).await;
    let first = register_trader(&platform, dec!(100)).await;
    let second = register_trader(&platform, dec!(100)).await;

    let (a, b) = tokio::join!(
        platform.trades.execute(
            &first,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        ),
        platform.trades.execute(
            &second,
            market_id,
            Side::Yes,
            TradeRequest::BuyByAmount { amount: dec!(10) },
        ),
    );
    let a = a.expect("first concurrent buy commits");
    let b = b.expect("second concurrent buy commits");

    let conn = platform.db.acquire().await.unwrap();
    let trades = TradeQueries::list_by_market(&conn, market_id, 10, 0)
        .await
        .unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[1].q_yes_before, trades[0].q_yes_after);

    let market = platform.markets.get(market_id).await.unwrap();
    assert_eq!(market.market.volume, a.trade.cost + b.trade.cost);
    assert_close(market.market.volume, dec!(20), dec!(0.002));

    for user in [&first, &second] {
        let wallet = platform.wallets.get_by_user(user.id).await.unwrap();
        let violations = platform.wallets.audit(wallet.id).await.unwrap();
        assert!(violations.is_empty(), "ledger violations: {violations:?}");
    }
}

#[tokio::test]
async fn lifecycle_rejects_disallowed_moves() {
    let Some(platform) = platform().await else {
        return;
    };

    let admin = seed_admin(&platform).await;
    let now = Utc::now();
    let market = platform
        .markets
        .create(
            &admin,
            NewMarket {
                title: "Lifecycle market".into(),
                description: String::new(),
                category: "testing".into(),
                image_url: None,
                resolution_source: None,
                liquidity: None,
                start_time: now,
                end_time: now + Duration::days(1),
            },
        )
        .await
        .expect("market created");
    assert_eq!(market.status, MarketStatus::Draft);
    assert_eq!(market.liquidity_b, dec!(1000));

    // draft -> suspended is not in the table.
    let err = platform
        .markets
        .transition(&admin, market.id, MarketStatus::Suspended)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    // Resolution is not reachable through the plain transition operation.
    let err = platform
        .markets
        .transition(&admin, market.id, MarketStatus::Resolved)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    // Draft markets cannot be resolved either.
    let err = platform
        .markets
        .resolve(&admin, market.id, Side::Yes)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    // Non-admins are rejected before any validation.
    let trader = register_trader(&platform, Decimal::ZERO).await;
    let err = platform
        .markets
        .transition(&trader, market.id, MarketStatus::Active)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");

    // The happy path still works: draft -> active -> suspended -> active.
    platform
        .markets
        .transition(&admin, market.id, MarketStatus::Active)
        .await
        .expect("activates");
    platform
        .markets
        .transition(&admin, market.id, MarketStatus::Suspended)
        .await
        .expect("suspends");
    let reactivated = platform
        .markets
        .transition(&admin, market.id, MarketStatus::Active)
        .await
        .expect("reactivates");
    assert_eq!(reactivated.status, MarketStatus::Active);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let Some(platform) = platform().await else {
        return;
    };

    let tag = Uuid::new_v4().simple().to_string();
    let email = format!("dup-{tag}@example.com");
    platform
        .users
        .register(&email, &format!("dup_{tag}"), "digest")
        .await
        .expect("first registration succeeds");
    let err = platform
        .users
        .register(&email, &format!("dup2_{tag}"), "digest")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
}
