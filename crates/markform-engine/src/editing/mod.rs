/*!
 * # Patch Application
 *
 * Forms are edited through **patches**: small JSON-serializable operations
 * that an agent or a user interface sends in batches.
 *
 * ## Model
 *
 * ### 1. Batches are sequential and partial
 * - Patches apply in order; each one sees the effect of the ones before it
 * - A patch is applied to a scratch copy and only committed when it succeeds
 * - A rejected patch changes nothing and the rest of the batch still runs
 * - The caller gets one [`PatchOutcome`] per patch, in input order
 *
 * ### 2. Shape errors are rejected, constraint errors are kept
 * - Unknown fields, options or columns, wrong field kinds and unparseable
 *   dates are rejected
 * - Lengths, ranges, patterns and counts are stored as given and reported
 *   by [`validate`](crate::validate::validate)
 * - `set_table` is the exception: its row count must fit the declared bounds
 *
 * ### 3. Response state machine
 *
 * ```text
 *            set_*                skip_field            abort_field
 *   empty ──────────▶ answered   ───────────▶ skipped   ───────────▶ aborted
 *     ▲                   │                                              │
 *     └── clear_field ────┴──────────────────────────────────────────────┘
 * ```
 *
 * - Setting an empty list, an empty selection, an all-initial checkbox set
 *   or zero table rows leaves the field `empty`
 * - Required fields cannot be skipped, only aborted
 * - `skip_field` always records a `skipped` note carrying the role;
 *   `abort_field` records an `aborted` note only when a reason is given
 * - Leaving `skipped` or `aborted` for any other state, `skipped` to
 *   `aborted` included, removes the notes that mirrored the old state for
 *   the field (including notes on its options, columns and cells)
 * - String values, list items, cell text and note text are stored with `\n`
 *   line breaks; `\r\n` and lone `\r` are converted on the way in
 *
 * ### 4. Notes
 * - `add_note` resolves its reference against the current rows of a table
 * - Note text is trimmed and may not contain directive syntax or an unclosed
 *   code fence, so it always serializes back to the same note
 *
 * ## Module Structure
 *
 * - **`patch`**: `Patch`, `CellInput` and the outcome types
 * - **`apply`**: `apply_patches` and the per-kind value handling
 */

pub mod apply;
pub mod patch;

pub use apply::apply_patches;
pub use patch::{ApplyResult, CellInput, Patch, PatchOutcome, PatchRejection};
