//! Path minimization (spec §4.4 "Path minimization"): given a raw
//! navigation path discovered during exploration, find the shortest
//! subsequence of steps that still reaches the same page, by greedily
//! testing whether later steps are directly reachable from the start.
//! Grounded in `_find_shortest_path`.

use std::sync::Arc;

use crate::domain::Step;

use super::driver::BrowserDriver;
use super::state::PathEntry;

/// Replays `path` from `start_url` and returns the minimized subsequence.
/// Always keeps the first step; a dropdown opener is never separated
/// from the item it revealed. Falls back to the original path if
/// minimization can't confirm a shorter one reaches the same page.
pub async fn minimize_path(
    driver: &Arc<dyn BrowserDriver>,
    start_url: &str,
    path: &[PathEntry],
) -> anyhow::Result<Vec<PathEntry>> {
    if path.len() <= 1 {
        return Ok(path.to_vec());
    }

    // (opener_index, item_index) pairs in the original indexing.
    let dropdown_pairs: Vec<(usize, usize)> = path
        .iter()
        .enumerate()
        .filter(|(i, entry)| entry.opens_dropdown && *i + 1 < path.len())
        .map(|(i, _)| (i, i + 1))
        .collect();

    driver.navigate(start_url).await?;
    driver.dismiss_popups().await?;
    driver.wait_for_page_stable().await?;

    let first = path[0].clone();
    if !click_entry(driver, &first).await? {
        return Ok(path.to_vec());
    }
    driver.wait_for_page_stable().await?;

    let remaining = &path[1..];
    let target = remaining.len() - 1;
    let mut shortest = vec![first];
    let mut clicked_up_to: isize = -1;
    let max_attempts = remaining.len() * 2;
    let mut attempts = 0;

    while (clicked_up_to as usize) < target && attempts < max_attempts {
        attempts += 1;
        let mut found = false;

        for i in (clicked_up_to as usize + 1..=target).rev() {
            let needs_opener = dropdown_pairs.iter().find_map(|&(opener, item)| {
                let opener = opener.checked_sub(1)?;
                let item = item.checked_sub(1)?;
                if item == i && opener as isize > clicked_up_to {
                    Some(opener)
                } else {
                    None
                }
            });

            if let Some(opener_idx) = needs_opener {
                let opener_step = remaining[opener_idx].clone();
                if click_entry(driver, &opener_step).await? {
                    driver.wait_for_page_stable().await?;
                    shortest.push(opener_step);
                    clicked_up_to = opener_idx as isize;

                    let item_step = remaining[i].clone();
                    if click_entry(driver, &item_step).await? {
                        driver.wait_for_page_stable().await?;
                        shortest.push(item_step);
                        clicked_up_to = i as isize;
                        found = true;
                        break;
                    }
                }
            } else {
                let step = remaining[i].clone();
                if click_entry(driver, &step).await? {
                    driver.wait_for_page_stable().await?;
                    shortest.push(step);
                    clicked_up_to = i as isize;
                    found = true;
                    break;
                }
            }
        }

        if !found {
            return Ok(path.to_vec());
        }
    }

    if clicked_up_to as usize == target {
        Ok(shortest)
    } else {
        Ok(path.to_vec())
    }
}

async fn click_entry(driver: &Arc<dyn BrowserDriver>, entry: &PathEntry) -> anyhow::Result<bool> {
    let step: Step = entry.to_step();
    let outcome = driver.execute_step(&step).await?;
    Ok(outcome.success)
}
