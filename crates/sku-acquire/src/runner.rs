use std::collections::HashSet;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use cartwatch_core_types::{SkuCombination, VariantKey, WatchError};

use crate::errors::AcquireError;
use crate::model::{AcquireReport, AcquireRequest, Progress, SkuOutcome, SkuResult};
use crate::policy::AcquirePolicy;
use crate::ports::{CartProbe, OptionState, PauseGate, ProductPage, ProgressSink, SkuTreeParser};
use crate::{precheck, tempo};

pub struct RuntimeDeps<'a> {
    pub page: &'a dyn ProductPage,
    pub probe: &'a dyn CartProbe,
    pub tree: &'a dyn SkuTreeParser,
    pub pause: &'a dyn PauseGate,
    pub progress: &'a dyn ProgressSink,
    pub policy: &'a AcquirePolicy,
}

#[derive(Clone, Debug)]
struct PlannedSku {
    combo: SkuCombination,
    already_in_cart: bool,
}

#[instrument(skip_all, fields(run = %req.run_id, account = %req.account.0, listing = %req.listing))]
pub async fn execute(
    req: &AcquireRequest,
    deps: RuntimeDeps<'_>,
) -> Result<AcquireReport, WatchError> {
    deps.pause.mark_acquisition_start(&req.account);
    let outcome = run_inner(req, &deps).await;
    deps.pause.mark_acquisition_end(&req.account);
    outcome
}

async fn run_inner(
    req: &AcquireRequest,
    deps: &RuntimeDeps<'_>,
) -> Result<AcquireReport, WatchError> {
    let in_cart = match &req.options.in_cart {
        Some(index) => index.clone(),
        None => precheck::derive_in_cart_index(deps.probe, &req.listing, deps.policy).await?,
    };

    let combos = deps.tree.parse_sku_tree(&req.listing).await?;
    let available: Vec<SkuCombination> = combos.into_iter().filter(SkuCombination::in_stock).collect();

    let mut rng = StdRng::from_entropy();
    let plan = plan_selection(available, &in_cart, req.options.target_count, &mut rng);
    let total = plan.len() as u32;
    info!(
        target: "sku-acquire",
        planned = total,
        already_in_cart = plan.iter().filter(|p| p.already_in_cart).count(),
        "acquisition plan ready"
    );

    let mut report = AcquireReport::default();
    deps.page.open_listing(&req.listing).await?;

    for (index, planned) in plan.iter().enumerate() {
        // Safe point: never suspend while a variant is half-selected.
        wait_while_paused(req, deps, report_progress(&report, total)).await;

        let key = planned.combo.variant_key();
        if planned.already_in_cart {
            report.record(SkuResult {
                key,
                props_text: planned.combo.props_text.clone(),
                outcome: SkuOutcome::AlreadyInCart,
                elapsed_ms: 0,
            });
            emit_progress(deps, &report, total, &format!("{} already in cart", planned.combo.props_text));
            continue;
        }

        let started = Instant::now();
        let outcome = add_with_retry(req, deps, &planned.combo).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                report.record(SkuResult {
                    key,
                    props_text: planned.combo.props_text.clone(),
                    outcome: SkuOutcome::Added,
                    elapsed_ms,
                });
                emit_progress(deps, &report, total, &format!("added {}", planned.combo.props_text));
            }
            Err(AcquireError::Challenge(detail)) => {
                // Cannot be worked around automatically; end the run now so
                // the caller can mark the account.
                return Err(WatchError::challenge(detail));
            }
            Err(err) => {
                warn!(target: "sku-acquire", sku = %planned.combo.props_text, error = %err, "sku failed");
                report.record(SkuResult {
                    key,
                    props_text: planned.combo.props_text.clone(),
                    outcome: SkuOutcome::Failed {
                        reason: err.to_string(),
                    },
                    elapsed_ms,
                });
                emit_progress(deps, &report, total, &format!("failed {}: {err}", planned.combo.props_text));
            }
        }

        let target = req.options.target_count;
        if target > 0 && report.in_cart_total() >= target {
            debug!(target: "sku-acquire", "target count reached early");
            break;
        }

        if index + 1 < plan.len() {
            wait_while_paused(req, deps, report_progress(&report, total)).await;
            let delay = tempo::inter_sku_delay(
                deps.policy.inter_sku_delay_ms,
                deps.policy.long_pause_probability,
                deps.policy.long_pause_extra_ms,
                &mut rng,
            );
            sleep(delay).await;
        }
    }

    if req.options.refresh_cart_after {
        match deps.probe.refresh_and_extract().await {
            Ok(cart) => report.refreshed_cart = Some(cart),
            Err(err) => {
                warn!(target: "sku-acquire", error = %err, "post-run cart refresh failed");
            }
        }
    }

    emit_progress(deps, &report, total, "run complete");
    Ok(report)
}

/// Pick which variants this run processes.
///
/// With a target count, variants already in the cart are prioritized to
/// count toward it (top-up stays idempotent), then the remainder is filled
/// from not-yet-added variants; both groups uniformly shuffled. Without a
/// target, every available variant is processed.
fn plan_selection(
    available: Vec<SkuCombination>,
    in_cart: &HashSet<VariantKey>,
    target_count: u32,
    rng: &mut StdRng,
) -> Vec<PlannedSku> {
    let (mut present, mut missing): (Vec<_>, Vec<_>) = available
        .into_iter()
        .partition(|combo| in_cart.contains(&combo.variant_key()));
    present.shuffle(rng);
    missing.shuffle(rng);

    let mut plan: Vec<PlannedSku> = Vec::new();
    for combo in present {
        plan.push(PlannedSku {
            combo,
            already_in_cart: true,
        });
    }
    for combo in missing {
        plan.push(PlannedSku {
            combo,
            already_in_cart: false,
        });
    }

    if target_count > 0 {
        plan.truncate(target_count as usize);
    }
    plan
}

async fn add_with_retry(
    req: &AcquireRequest,
    deps: &RuntimeDeps<'_>,
    combo: &SkuCombination,
) -> Result<(), AcquireError> {
    let attempts = deps.policy.max_attempts_per_sku.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            // Reset to the product page; a failed attempt can leave stale
            // selection state behind.
            if let Err(err) = deps.page.open_listing(&req.listing).await {
                return Err(match to_add_error(err) {
                    challenge @ AcquireError::Challenge(_) => challenge,
                    other => AcquireError::AddRejected(format!("product page reset failed: {other}")),
                });
            }
        }
        match add_single_sku(deps, combo).await {
            Ok(()) => return Ok(()),
            Err(err @ AcquireError::Challenge(_)) => return Err(err),
            Err(err) => {
                debug!(target: "sku-acquire", attempt, error = %err, "sku attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or(AcquireError::NoConfirmation))
}

/// The per-SKU state machine: dismiss obstructions, select each dimension
/// sequentially, verify completeness, then click add-to-cart and race the
/// success signals.
async fn add_single_sku(
    deps: &RuntimeDeps<'_>,
    combo: &SkuCombination,
) -> Result<(), AcquireError> {
    let page = deps.page;

    page.dismiss_obstructions().await.map_err(to_add_error)?;

    for selection in &combo.selections {
        match page.option_state(selection).await.map_err(to_add_error)? {
            OptionState::Selected => continue,
            OptionState::Missing => {
                return Err(AcquireError::OptionMissing {
                    dimension: selection.prop_name.clone(),
                    value: selection.value_name.clone(),
                });
            }
            OptionState::Disabled => {
                return Err(AcquireError::OptionDisabled {
                    dimension: selection.prop_name.clone(),
                    value: selection.value_name.clone(),
                });
            }
            OptionState::Selectable => {
                page.click_option(selection).await.map_err(to_add_error)?;
                wait_for_selected(deps, selection).await?;
            }
        }
    }

    let unselected = page.unselected_dimensions().await.map_err(to_add_error)?;
    if !unselected.is_empty() {
        return Err(AcquireError::unselected(&unselected));
    }

    if !page.add_to_cart_enabled().await.map_err(to_add_error)? {
        return Err(AcquireError::AddControlDisabled);
    }

    let baseline = page.cart_count().await.map_err(to_add_error)?;
    page.click_add_to_cart().await.map_err(to_add_error)?;

    match wait_for_add_confirmation(deps, baseline).await {
        Ok(()) => {
            if let Err(err) = page.dismiss_confirmation().await {
                debug!(target: "sku-acquire", error = %err, "confirmation popup dismissal failed");
            }
            Ok(())
        }
        Err(err) => {
            if let Ok(Some(detail)) = page.detect_challenge().await {
                return Err(AcquireError::Challenge(detail));
            }
            Err(err)
        }
    }
}

async fn wait_for_selected(
    deps: &RuntimeDeps<'_>,
    selection: &cartwatch_core_types::PropertySelection,
) -> Result<(), AcquireError> {
    let deadline = Instant::now() + deps.policy.selection_applied();
    loop {
        match deps
            .page
            .option_state(selection)
            .await
            .map_err(to_add_error)?
        {
            OptionState::Selected => return Ok(()),
            _ if Instant::now() >= deadline => {
                return Err(AcquireError::SelectionNotApplied {
                    dimension: selection.prop_name.clone(),
                    value: selection.value_name.clone(),
                });
            }
            _ => sleep(deps.policy.signal_poll()).await,
        }
    }
}

/// Race the two independent success signals (affirmative toast, cart-count
/// increase) against the confirmation window; whichever resolves first wins.
async fn wait_for_add_confirmation(
    deps: &RuntimeDeps<'_>,
    baseline: Option<u32>,
) -> Result<(), AcquireError> {
    let page = deps.page;
    let poll = deps.policy.signal_poll();

    let toast_watch = async {
        loop {
            if let Ok(Some(_)) = page.success_toast().await {
                return;
            }
            sleep(poll).await;
        }
    };
    let count_watch = async {
        loop {
            if let (Some(before), Ok(Some(now))) = (baseline, page.cart_count().await) {
                if now > before {
                    return;
                }
            }
            sleep(poll).await;
        }
    };

    let raced = async {
        tokio::select! {
            _ = toast_watch => {}
            _ = count_watch => {}
        }
    };

    match timeout(deps.policy.add_confirm(), raced).await {
        Ok(()) => Ok(()),
        Err(_) => match page.rejection_reason().await {
            Ok(Some(reason)) => Err(AcquireError::AddRejected(reason)),
            _ => Err(AcquireError::NoConfirmation),
        },
    }
}

async fn wait_while_paused(req: &AcquireRequest, deps: &RuntimeDeps<'_>, progress: Progress) {
    if !deps.pause.is_pause_requested(&req.account) {
        return;
    }
    deps.pause.notify_paused_at_safe_point(&req.account).await;
    deps.progress
        .progress(progress, Some("paused for a higher-priority task"));

    // Polled rather than purely blocking: a stalled resume signal cannot
    // wedge the run silently.
    loop {
        let resumed = deps.pause.wait_until_resumed(&req.account);
        tokio::select! {
            _ = resumed => break,
            _ = sleep(deps.policy.pause_poll()) => {
                if !deps.pause.is_pause_requested(&req.account) {
                    break;
                }
                deps.progress.progress(progress, Some("still paused"));
            }
        }
    }
}

fn report_progress(report: &AcquireReport, total: u32) -> Progress {
    Progress {
        done: report.results.len() as u32,
        total,
    }
}

fn emit_progress(deps: &RuntimeDeps<'_>, report: &AcquireReport, total: u32, line: &str) {
    deps.progress.progress(report_progress(report, total), Some(line));
}

fn to_add_error(err: WatchError) -> AcquireError {
    if err.is_challenge() {
        AcquireError::Challenge(err.to_string())
    } else {
        AcquireError::AddRejected(err.to_string())
    }
}
